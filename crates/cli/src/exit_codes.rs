//! CLI Exit Code Registry
//!
//! Single source of truth for `ordercheck` exit codes. Scripts rely on them.
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error (unspecified)                   |
//! | 2       | Universal | Usage error (bad args, invalid config)        |
//! | 3-9     | check     | Reconciliation outcomes and input/output      |
//! | 50-59   | fetch     | Remote order source                           |

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Unspecified failure. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments or an invalid config file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Check (3-9)
// =============================================================================

/// `check --strict` found total or item mismatches.
pub const EXIT_CHECK_MISMATCH: u8 = 3;

/// An input workbook, order file or corrections file could not be read.
pub const EXIT_INPUT_PARSE: u8 = 4;

/// A report, corrections file or patched workbook could not be written.
pub const EXIT_OUTPUT_WRITE: u8 = 5;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// Store credentials missing from the environment.
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Token minting failed or the token was rejected after a refresh.
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Request rejected by the store (other 4xx, GraphQL errors).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// 5xx or network failure after retries.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;
