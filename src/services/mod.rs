//! Service layer for the bulletin pipeline.
//!
//! This module contains the business logic for:
//! - Session lifecycle (`SessionManager`)
//! - Interactive login (`LoginProvider`, `CommandLogin`)
//! - Bulletin retrieval (`BulletinFetcher`)
//! - Bulletin text parsing (`BulletinParser`)
//! - Risk classification (`RiskClassifier`)

mod classifier;
mod fetcher;
mod login;
mod parser;
mod session;

pub use classifier::RiskClassifier;
pub use fetcher::{BulletinFetcher, FetchedBulletin};
pub use login::{CommandLogin, LoginProvider, LoginResult};
pub use parser::{
    BulletinParser, ParsedBulletin, Records, extract_issued_label, extract_port_name,
    extract_station_id,
};
pub use session::{SessionManager, SessionState};
