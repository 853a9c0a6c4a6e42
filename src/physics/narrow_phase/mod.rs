pub mod epa;
pub mod gjk;

pub use epa::{generate_contact, Contact};
pub use gjk::{cso_support, intersect, ShapePose, Simplex, SupportPoint};

/// Full narrow-phase query: GJK intersection test, then EPA contact
/// generation when the shapes overlap.
pub fn detect(a: &ShapePose, b: &ShapePose) -> Option<Contact> {
    let simplex = intersect(a, b)?;
    generate_contact(&simplex, a, b)
}
