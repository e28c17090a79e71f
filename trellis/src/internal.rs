mod invoke;
mod tree;

pub(crate) use invoke::invoke;
pub(crate) use tree::Tree;
