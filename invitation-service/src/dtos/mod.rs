mod invitation;

pub use invitation::*;
