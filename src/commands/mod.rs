// Plugin deployment
pub mod deploy;
pub mod render;
pub mod status;
pub mod validate;

// Admin menu
pub mod menus;

/// Attach the category's description and advice to a connection failure
pub fn remote_error(e: remote::Error) -> anyhow::Error {
    let category = e.category();
    anyhow::Error::new(e).context(format!(
        "{}: {}",
        category.description(),
        category.advice()
    ))
}

/// Attach the category's description and advice to a menu API failure
pub fn menu_error(e: ::menus::Error) -> anyhow::Error {
    let category = e.category();
    anyhow::Error::new(e).context(format!(
        "{}: {}",
        category.description(),
        category.advice()
    ))
}
