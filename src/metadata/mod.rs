pub mod fetch;
pub mod identity;
pub mod resolver;

pub use fetch::{Ec2IdentityDocument, FetcherConfig, HttpMetadataFetcher, MetadataError, MetadataFetcher};
pub use identity::{Identity, Platform};
pub use resolver::{ConfigError, IdentityOverrides, MetadataResolver};
