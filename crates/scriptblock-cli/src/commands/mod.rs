pub mod check;
pub mod info;
pub mod layout;
pub mod parse;
