pub use shared_types::{PlannerError, PlannerResult};
