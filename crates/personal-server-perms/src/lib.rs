//! # Personal Server Perms
//!
//! Resolves a permission id into an authorized grant and the file records
//! it covers.
//!
//! Resolution reads the on-chain permission record, fetches the grant
//! document it points to, validates the grant's schema and then checks, in
//! order: supported operation, grantee equals requester, expiry in the
//! future. Each failure carries its own reason. Files are resolved through
//! the registry, with the wrapped key looked up for the server address
//! derived from each file's owner.

pub mod error;
pub mod resolver;

pub use error::{PermsError, Result};
pub use resolver::{
    FileAuthority, PermissionResolver, ResolvedPermission, ResolverConfig,
    DEFAULT_SUPPORTED_OPERATIONS,
};
