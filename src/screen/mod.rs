// Screening core: decline ranking, breakout confirmation and candidate assembly
pub mod assembler;
pub mod filter;
pub mod ranker;

pub use assembler::{assemble_candidate, round_price};
pub use filter::{ConfirmationFilter, ConfirmationRule, FilterDecision, RejectReason};
pub use ranker::{rank_decliners, DeclineObservation, DEFAULT_MAX_DECLINERS};
