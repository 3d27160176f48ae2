//! Admission control: outcome types and the policy that computes them.

mod decision;
mod policy;

pub use decision::{Admission, Blockage, Grant};
pub use policy::AdmissionPolicy;
