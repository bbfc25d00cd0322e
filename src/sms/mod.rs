mod dedup;
mod parser;
mod providers;

pub(crate) use dedup::{
    find_sms_for_slip, ingest_sms, merge_slip_into_sms, sweep_stale, IngestOutcome, SlipEvidence,
};
pub(crate) use parser::{SmsCandidate, SmsParser};
