pub mod candidate;
pub mod lookup;
pub mod matcher;
pub mod name;
pub mod planner;
pub mod postcode;
pub mod record;

pub use candidate::{Candidate, CandidateSet, ScoreKind};
pub use lookup::{Lookup, LookupError, LookupResponse};
pub use matcher::{MatchPolicy, Selection, match_record};
pub use name::{NameNormalization, name_similarity};
pub use planner::{Query, QueryPlan};
pub use postcode::{PostcodeConfidence, compare_postcodes, normalize_postcode};
pub use record::{CachedRecord, InputRecord, MatchDecision};
