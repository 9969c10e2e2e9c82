pub mod libbenkyou;
