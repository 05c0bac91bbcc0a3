pub(crate) mod component;
pub(crate) mod renderer;
