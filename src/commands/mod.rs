pub mod check;
pub mod expand;
pub mod up;
