//! Shared constants for end-to-end tests
//!
//! When seeded users or documents change, update only this file.

// ============================================================================
// Test Users
// ============================================================================

/// Admin user created for every test server
pub const ADMIN_UID: &str = "admin-1";

/// Admin user email, shown as `startedByEmail` on cache clear jobs
pub const ADMIN_EMAIL: &str = "admin@chathub.test";

/// Regular user without admin access
pub const MEMBER_UID: &str = "member-1";

/// Regular user email
pub const MEMBER_EMAIL: &str = "member@chathub.test";

// ============================================================================
// Seeded Documents
// ============================================================================

/// Live company document
pub const COMPANY_1_ID: &str = "company-acme";

/// Second live company document
pub const COMPANY_2_ID: &str = "company-globex";

/// Live user document
pub const USER_DOC_1_ID: &str = "user-jane";

/// Number of documents seeded in each cache collection
pub const CACHE_DOCS_PER_COLLECTION: usize = 3;

/// Number of log documents seeded
pub const LOG_DOCS: usize = 5;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Per-request timeout of the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum time to wait for a cache clear job to leave `in_progress`
pub const JOB_COMPLETION_TIMEOUT_MS: u64 = 5000;
