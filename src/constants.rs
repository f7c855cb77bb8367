pub const PREFIX_JOB: &str = "sq:job";
pub const PREFIX_QUEUE: &str = "sq:queue";
pub const PREFIX_PROCESSING: &str = "sq:processing";
pub const PREFIX_DEAD: &str = "sq:dead";
pub const QUEUES_SET_KEY: &str = "sq:queues";

pub const DEFAULT_QUEUE: &str = "sequence-search";
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 900;
pub const RESULT_EXTENSION: &str = "m8";
