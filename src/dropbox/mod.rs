//! Dropbox integration: remote filesystem client and OAuth flow.

pub mod client;
pub mod oauth;

pub use client::{
    AccountInfo, DropboxClient, DropboxConnector, ListPage, RemoteConnector, RemoteError,
    RemoteFile, RemoteSession,
};
pub use oauth::{run_callback_server, CredentialRefresher, OAuthClient, OAuthSettings};
