pub mod band_plan;
pub mod leq_stats;
pub mod pcm;
pub mod ring_buffer;
pub mod spectral;
