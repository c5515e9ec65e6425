// src/constants.rs
//
// Central location for all constants used throughout hd-injector
// Every default the CLI and YAML config fall back to lives here

// =============================================================================
// Endpoints
// =============================================================================

/// Primary HyperDrive server targeted in server topology
pub const DEFAULT_SERVER_ENDPOINT: &str = "http://127.0.0.1:4244/";

/// Reference servers whose group index is reported after a client-topology run
pub const DEFAULT_REFERENCE_ENDPOINTS: [&str; 3] = [
    "http://127.0.0.1:4244/",
    "http://127.0.0.1:4245/",
    "http://127.0.0.1:4246/",
];

/// Upper bound on reference endpoints queried after a client-topology run
pub const MAX_REFERENCE_ENDPOINTS: usize = 3;

/// Host of the HyperDrive client endpoints
pub const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

/// Port of client endpoint 0; endpoint N listens on base + N
pub const DEFAULT_CLIENT_BASE_PORT: u16 = 8889;

// =============================================================================
// Workload Defaults
// =============================================================================

/// Number of logical workers launched per pool
pub const DEFAULT_WORKERS: usize = 64;

/// Sequential operations issued by each worker
pub const DEFAULT_OPS_PER_WORKER: usize = 1;

/// Payload size for store operations (1 MiB)
pub const DEFAULT_PAYLOAD_SIZE: u64 = 1024 * 1024;

/// Number of client endpoints addressed in client topology
pub const DEFAULT_CLIENT_COUNT: usize = 1;

/// Concurrency ceiling: workers holding a slot at once, process-wide.
/// Sized to stay below the usual open file descriptor limit.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

// =============================================================================
// Key / Payload Generation
// =============================================================================

/// Length of the random hex keys used against the server API
pub const SERVER_KEY_LEN: usize = 64;

/// Alphabet for server keys
pub const SERVER_KEY_ALPHABET: &[u8] = b"0123456789ABCDEF";

/// Exclusive upper bound of the per-worker client key discriminator
pub const CLIENT_DISCRIMINATOR_RANGE: u32 = 1000;

/// Payload bytes are drawn from [PAYLOAD_BYTE_MIN, PAYLOAD_BYTE_MAX)
pub const PAYLOAD_BYTE_MIN: u8 = b'A';
pub const PAYLOAD_BYTE_MAX: u8 = b'Z';

/// Mixed with the worker ordinal to derive per-worker seeds
pub const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

// =============================================================================
// Wire Format
// =============================================================================

/// Content-Type prefix for server store requests; the payload length and a
/// trailing ';' are appended
pub const SERVER_DATA_CONTENT_TYPE: &str = "application/x-scality-storage-data;data=";

/// Accept header for server retrieve/delete requests
pub const SERVER_ACCEPT: &str = "application/x-scality-storage-data;meta;usermeta;data";

/// Path segment in front of keys on the server API
pub const SERVER_STORE_PREFIX: &str = "store/";

/// Index listing paths, relative to an endpoint
pub const KEY_INDEX_PATH: &str = "info/index/key/list/";
pub const GROUP_INDEX_PATH: &str = "info/index/group/list/";

// =============================================================================
// Failure Tracking
// =============================================================================

/// Number of logged failure messages retained per pool for the summary
pub const MAX_RETAINED_FAILURE_MESSAGES: usize = 20;

// =============================================================================
// Progress Bar Configuration
// =============================================================================

/// Template used when --progress is enabled
pub const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} workers {msg}";
