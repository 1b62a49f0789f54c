use url::Url;

use crate::platform::MenuItem;
use crate::settings::ImageFormat;

pub const PARENT_MENU_ID: &str = "imagecraft-parent";

const LENS_UPLOAD_ENDPOINT: &str = "https://lens.google.com/uploadbyurl";

// Right-click menu shown on images. Chrome renders items with children as
// submenus, so "save-as" and "copy-as" are headers rather than commands.
pub fn menu_catalog() -> Vec<MenuItem> {
    vec![
        MenuItem::action(PARENT_MENU_ID, "ImageCraft"),
        MenuItem::action("save-as", "Save As...").child_of(PARENT_MENU_ID),
        MenuItem::action("save-as-png", "PNG").child_of("save-as"),
        MenuItem::action("save-as-jpg", "JPG").child_of("save-as"),
        MenuItem::action("save-as-webp", "WEBP").child_of("save-as"),
        MenuItem::action("copy-as", "Copy Image As...").child_of(PARENT_MENU_ID),
        MenuItem::action("copy-as-png", "PNG").child_of("copy-as"),
        MenuItem::action("copy-as-png-no-bg", "PNG without Background").child_of("copy-as"),
        MenuItem::action("copy-as-jpg", "JPG").child_of("copy-as"),
        MenuItem::action("copy-as-webp", "WEBP").child_of("copy-as"),
        MenuItem::separator("separator-1", PARENT_MENU_ID),
        MenuItem::action("open-in-new-tab", "Open Image in New Tab").child_of(PARENT_MENU_ID),
        MenuItem::action("search-with-lens", "Search with Google Lens").child_of(PARENT_MENU_ID),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Convert(ImageFormat),
    Copy(ImageFormat),
    RemoveBackground,
    OpenInNewTab,
    SearchWithLens,
}

pub fn parse_menu_command(menu_id: &str) -> Option<MenuCommand> {
    match menu_id {
        "save-as-png" => Some(MenuCommand::Convert(ImageFormat::Png)),
        "save-as-jpg" => Some(MenuCommand::Convert(ImageFormat::Jpg)),
        "save-as-webp" => Some(MenuCommand::Convert(ImageFormat::Webp)),
        "copy-as-png" => Some(MenuCommand::Copy(ImageFormat::Png)),
        "copy-as-jpg" => Some(MenuCommand::Copy(ImageFormat::Jpg)),
        "copy-as-webp" => Some(MenuCommand::Copy(ImageFormat::Webp)),
        "copy-as-png-no-bg" => Some(MenuCommand::RemoveBackground),
        "open-in-new-tab" => Some(MenuCommand::OpenInNewTab),
        "search-with-lens" => Some(MenuCommand::SearchWithLens),
        _ => None,
    }
}

pub fn lens_search_url(image_url: &str) -> String {
    match Url::parse(LENS_UPLOAD_ENDPOINT) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("url", image_url);
            url.into()
        }
        Err(_) => String::from(LENS_UPLOAD_ENDPOINT),
    }
}
