pub mod admin;
pub mod analytics;
pub mod commands;
pub mod csv_io;
pub mod error;
pub mod leaderboard;
pub mod points;
pub mod submissions;

#[cfg(test)]
mod test_support;

pub use error::{ServiceError, ServiceResult};

/// Current UTC time as an RFC 3339 string, the format every stored
/// timestamp uses.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
