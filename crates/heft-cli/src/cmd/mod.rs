pub(crate) mod pre_push;
pub(crate) mod push;
