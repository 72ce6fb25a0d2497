use crate::error::MapBookError;

/// One page of the book: a region plus the two indicator values charted on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpec {
    pub page_number: usize,
    pub region_key: String,
    pub indicator_a: f64,
    pub indicator_b: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub label: String,
    pub value: f64,
}

/// Records tabulated on a single page, in the order they are drawn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Value,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Field names the selection expression is written against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFields {
    pub region_field: String,
    pub value_field: String,
}

impl Default for QueryFields {
    fn default() -> Self {
        Self {
            region_field: "STATE_NAME".to_string(),
            value_field: "HisPerChange".to_string(),
        }
    }
}

/// `region = <region> AND value > <threshold>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub fields: QueryFields,
    pub region: String,
    pub threshold: f64,
}

impl Predicate {
    pub fn matches(&self, region: &str, value: f64) -> bool {
        region == self.region && value > self.threshold
    }

    /// The predicate as an attribute query expression, suitable as a layer definition query.
    pub fn to_query_string(&self) -> String {
        format!(
            "\"{}\" = '{}' AND \"{}\" > {}",
            self.fields.region_field,
            self.region.replace('\'', "''"),
            self.fields.value_field,
            self.threshold
        )
    }
}

/// The external query engine: selection, ordering and counting of records.
pub trait RecordSource {
    fn select_records(
        &self,
        region_key: &str,
        predicate: &Predicate,
    ) -> Result<RecordSet, MapBookError>;

    fn sort_records(&self, set: RecordSet, key: SortKey, order: SortOrder) -> RecordSet {
        let mut records = set.into_vec();
        records.sort_by(|a, b| {
            let ord = match key {
                SortKey::Value => a.value.total_cmp(&b.value),
                SortKey::Label => a.label.cmp(&b.label),
            };
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        RecordSet::new(records)
    }

    fn count_records(&self, set: &RecordSet) -> usize {
        set.len()
    }
}

/// The ordered page list the book iterates over.
pub trait PageSource {
    fn page_list(&self) -> Result<Vec<PageSpec>, MapBookError>;

    fn page_count(&self) -> Result<usize, MapBookError> {
        Ok(self.page_list()?.len())
    }
}

/// Checks the page list is numbered 1..=N in order, with finite indicators.
pub fn validate_page_list(pages: &[PageSpec]) -> Result<(), MapBookError> {
    for (idx, page) in pages.iter().enumerate() {
        let expected = idx + 1;
        if page.page_number != expected {
            return Err(MapBookError::data(
                Some(page.page_number),
                None,
                format!(
                    "page list out of sequence: expected page {} but found {}",
                    expected, page.page_number
                ),
            ));
        }
        for (name, value) in [("indicator_a", page.indicator_a), ("indicator_b", page.indicator_b)]
        {
            if !value.is_finite() {
                return Err(MapBookError::data(
                    Some(page.page_number),
                    None,
                    format!("{} for {} is not a finite number", name, page.region_key),
                ));
            }
        }
    }
    Ok(())
}

/// Fetches the ascending-by-value record set tabulated on a page.
pub struct RecordProvider<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    fields: QueryFields,
    threshold: f64,
}

impl<'a, S: RecordSource + ?Sized> RecordProvider<'a, S> {
    pub fn new(source: &'a S, fields: QueryFields, threshold: f64) -> Self {
        Self {
            source,
            fields,
            threshold,
        }
    }

    pub fn predicate_for(&self, page: &PageSpec) -> Predicate {
        Predicate {
            fields: self.fields.clone(),
            region: page.region_key.clone(),
            threshold: self.threshold,
        }
    }

    pub fn fetch(&self, page: &PageSpec) -> Result<RecordSet, MapBookError> {
        let predicate = self.predicate_for(page);
        let selected = self.source.select_records(&page.region_key, &predicate)?;
        for record in &selected {
            if record.label.trim().is_empty() {
                return Err(MapBookError::data(
                    Some(page.page_number),
                    None,
                    "record has an empty label",
                ));
            }
            if !record.value.is_finite() {
                return Err(MapBookError::data(
                    Some(page.page_number),
                    Some(record.label.clone()),
                    "value is not a finite number",
                ));
            }
        }
        let sorted = self
            .source
            .sort_records(selected, SortKey::Value, SortOrder::Ascending);
        let count = self.source.count_records(&sorted);
        if count != sorted.len() {
            return Err(MapBookError::data(
                Some(page.page_number),
                None,
                format!(
                    "record source counted {} records but returned {}",
                    count,
                    sorted.len()
                ),
            ));
        }
        Ok(sorted)
    }
}
