pub(crate) mod frame_cache;
