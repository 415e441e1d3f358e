mod compare;
mod helpers;
mod list;
mod price;
mod recipe;

pub(crate) use compare::cmd_compare;
pub(crate) use list::{
    cmd_add, cmd_clear, cmd_list, cmd_remove, cmd_rename, cmd_set_checked, cmd_set_quantity,
    cmd_set_total,
};
pub(crate) use price::{cmd_price_add, cmd_price_import};
pub(crate) use recipe::{
    cmd_recipe_add_ingredient, cmd_recipe_cost, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_import, cmd_recipe_list, cmd_recipe_shop, cmd_recipe_show,
};
