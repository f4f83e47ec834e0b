//! Configuration for RPP.
//!
//! - [`global`] - the TOML credential store and settings (`~/.rpp/config.toml`)
//! - [`session`] - short-lived pending sessions for the Dropbox link flow
//!
//! Components never look configuration up on their own: the CLI loads a
//! [`GlobalConfig`] once and passes the pieces each collaborator needs into
//! its constructor.

pub mod global;
pub mod session;

pub use global::{
    DropboxCredentials, GitHubCredentials, GlobalConfig, RestartConfig, resolve_config_path,
};
pub use session::{PendingLink, PendingLinkStore, current_actor};
