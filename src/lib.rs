// HTTP API (routers, handlers, auth middleware)
pub mod api;

// Server configuration
pub mod config;

// Password reset email delivery
pub mod email;

// API error taxonomy
pub mod error;

// Meta Graph API client (Instagram linking + sync)
pub mod meta;

// OAuth login (Google/Microsoft) and account linking
pub mod oauth;

// Password hashing and reset codes
pub mod password;

// Session issuance (access/refresh token pairs)
pub mod session;

// Users, companies, refresh tokens, synced data
pub mod store;

// JWT signing and verification
pub mod token;
