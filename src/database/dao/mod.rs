pub mod poets;

pub use poets::{PoetDao, PoetRecord};
