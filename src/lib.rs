//! mewo: an interpreter for Mewofiles.
//!
//! A Mewofile declares variables, labeled blocks, platform and feature
//! conditionals and shell commands. The [`mewoparse`] tree parses it into a
//! flat statement list and executes a label or the top level.

pub mod constants;
pub mod mewoparse;
