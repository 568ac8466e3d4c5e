mod auth;
mod callback;
mod common;
mod data;
mod root;
mod sync;

pub(crate) use root::get_args;
