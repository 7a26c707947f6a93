#![allow(dead_code)]

pub use log::info;

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

pub use candle_gnn::{candle_core, candle_nn};

pub use spot_util::common_io::{mkdir, read_lines, write_lines};
pub use spot_util::traits::*;
