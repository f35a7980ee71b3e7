//! Built-in classical poems that can be copied into the prompt field.

/// A poem offered in the sidebar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoemCatalogEntry {
    /// Title shown in the dropdown.
    pub title: &'static str,
    /// Full text inserted into the prompt.
    pub body: &'static str,
}

static POEMS: [PoemCatalogEntry; 3] = [
    PoemCatalogEntry {
        title: "庐山谣",
        body: "百川东到海，何时复西归？少壮不努力，老大徒伤悲。",
    },
    PoemCatalogEntry {
        title: "将进酒",
        body: "君不见黄河之水天上来，奔流到海不复回。\n君不见高堂明镜悲白发，朝如青丝暮成雪。",
    },
    PoemCatalogEntry {
        title: "静夜思",
        body: "床前明月光，疑是地上霜。\n举头望明月，低头思故乡。",
    },
];

/// All catalog entries, in dropdown order.
pub fn entries() -> &'static [PoemCatalogEntry] {
    &POEMS
}

/// Catalog titles, in dropdown order.
pub fn titles() -> impl Iterator<Item = &'static str> {
    entries().iter().map(|poem| poem.title)
}

/// Returns the poem body for `title`, `None` for unknown titles.
pub fn lookup(title: &str) -> Option<&'static str> {
    entries()
        .iter()
        .find(|poem| poem.title == title)
        .map(|poem| poem.body)
}
