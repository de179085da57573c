pub mod config;
pub mod credentials;
pub mod error;
pub mod imagine;
pub mod ledger;
pub mod media;
pub mod observability;
pub mod protocol;
pub mod stream;
pub mod translate;

mod util;
