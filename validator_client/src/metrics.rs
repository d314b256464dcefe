pub use lighthouse_metrics::*;

pub const SUCCESS: &str = "success";
pub const SLASHABLE: &str = "slashable";
pub const SUBMISSION_FAILED: &str = "submission_failed";
pub const UNAVAILABLE: &str = "unavailable";
pub const INVALID: &str = "invalid";
pub const DUPLICATE: &str = "duplicate";

pub const ATTESTATION_WAIT: &str = "attestation_wait";
pub const ATTESTATION_SERVICE: &str = "attestation_service";
pub const BLOCK_SERVICE: &str = "block_service";

lazy_static::lazy_static! {
    pub static ref ATTESTATION_OUTCOMES: Result<IntCounterVec> = try_create_int_counter_vec(
        "vc_attestation_outcomes_total",
        "Count of attestation duties by outcome",
        &["outcome"]
    );
    pub static ref BLOCK_OUTCOMES: Result<IntCounterVec> = try_create_int_counter_vec(
        "vc_block_outcomes_total",
        "Count of block proposal duties by outcome",
        &["outcome"]
    );
    pub static ref DUTY_TIMES: Result<HistogramVec> = try_create_histogram_vec(
        "vc_duty_times_seconds",
        "Duration to perform validator duties",
        &["task"]
    );
}
