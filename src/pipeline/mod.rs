//! Three-stage extraction pipeline: extract raw candidates, normalize and
//! merge them, then validate and score the result.

pub mod extract;
pub mod transform;
pub mod validate;

pub use extract::LeadExtractor;
pub use transform::LeadTransformer;
pub use validate::{LeadValidator, ValidationOutcome};
