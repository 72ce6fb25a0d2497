/// Current-page context shared by rendering and export.
#[derive(Debug, Clone, PartialEq)]
pub struct DocContext {
    pub page_number: usize,
    pub page_count: usize,
    pub region_key: String,
    /// Attribute query the page's records were selected with.
    pub definition_query: String,
}

impl DocContext {
    pub fn new(
        page_number: usize,
        page_count: usize,
        region_key: impl Into<String>,
        definition_query: impl Into<String>,
    ) -> Self {
        Self {
            page_number,
            page_count,
            region_key: region_key.into(),
            definition_query: definition_query.into(),
        }
    }

    /// Expands `{region}`, `{page}` and `{pages}` in static template text.
    pub fn substitute(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        text.replace("{region}", &self.region_key)
            .replace("{pages}", &self.page_count.to_string())
            .replace("{page}", &self.page_number.to_string())
    }
}
