//! AWS SDK clients and the Secrets Manager bootstrap of the search secret.
//!
//! Clients are only built when something needs them: the `kms` backend or a
//! `SEARCH_HASH_SECRET_ARN`.

pub mod clients;
pub mod secrets;

pub use clients::AwsClients;
