// Entry-point operations used by the wizard, the unattended runner and the CLI verbs.

pub mod installer;
pub mod lifecycle;
pub mod release;
