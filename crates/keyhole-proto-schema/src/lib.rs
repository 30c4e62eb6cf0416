mod keygen;

pub mod v1 {
    pub use crate::keygen::v1::*;
}
