mod goals;
mod helpers;
mod import;
mod seed;
mod user;

pub(crate) use goals::cmd_goals;
pub(crate) use import::cmd_import_cofid;
pub(crate) use seed::cmd_seed;
pub(crate) use user::cmd_add_user;
