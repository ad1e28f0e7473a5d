pub mod check;
pub mod decide;
pub mod pass;
pub mod status;
