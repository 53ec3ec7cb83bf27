//! Lenses: named views and actions bound to cursors.
//!
//! A [`Lens`] is built from a function returning a [`LensDef`]. Binding it
//! to a cursor gives a [`LensInstance`], cached per cursor:
//! - views compute values from a consistent snapshot and must not write
//! - actions run inside an update of the cursor, so a whole action (nested
//!   views and actions included) commits and notifies once
//! - plain entries of the cursor's value are reachable with
//!   [`LensInstance::get`] and [`LensInstance::keys`]

mod data;
mod def;
mod lens;

pub use data::{LensData, RunInAction};
pub use def::{LensDef, LensFn};
pub use lens::{lens, subscribe_to_lens, Lens, LensInstance};
