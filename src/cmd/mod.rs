pub mod clip;
pub mod episodes;
pub mod serve;
