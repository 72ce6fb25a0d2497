use crate::error::MapBookError;
use crate::records::{PageSource, PageSpec, Predicate, Record, RecordSet, RecordSource};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawDataFile {
    pages: Vec<RawPage>,
    #[serde(default)]
    records: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    page_number: usize,
    region: String,
    indicator_a: Value,
    indicator_b: Value,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    region: Option<String>,
    name: Option<String>,
    value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
struct RegionRecord {
    region: String,
    record: Record,
}

/// Region pages and their records held in memory, loaded from a JSON data file.
///
/// ```json
/// {
///   "pages":   [{"page_number": 1, "region": "Texas", "indicator_a": 32.0, "indicator_b": 37.6}],
///   "records": [{"region": "Texas", "name": "Harris", "value": 128.4}]
/// }
/// ```
///
/// Values must be JSON numbers; anything else is reported as a data error naming the record
/// rather than being coerced.
#[derive(Debug, Clone, Default)]
pub struct JsonDataSource {
    pages: Vec<PageSpec>,
    records: Vec<RegionRecord>,
}

impl JsonDataSource {
    pub fn from_parts(pages: Vec<PageSpec>, records: Vec<(String, Record)>) -> Self {
        Self {
            pages,
            records: records
                .into_iter()
                .map(|(region, record)| RegionRecord { region, record })
                .collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, MapBookError> {
        let raw: RawDataFile = serde_json::from_str(json)
            .map_err(|err| MapBookError::data(None, None, format!("data file json: {err}")))?;

        let mut pages = Vec::with_capacity(raw.pages.len());
        for page in raw.pages {
            let indicator_a = number_field(&page.indicator_a).ok_or_else(|| {
                MapBookError::data(
                    Some(page.page_number),
                    None,
                    format!("indicator_a for {} is not a number", page.region),
                )
            })?;
            let indicator_b = number_field(&page.indicator_b).ok_or_else(|| {
                MapBookError::data(
                    Some(page.page_number),
                    None,
                    format!("indicator_b for {} is not a number", page.region),
                )
            })?;
            pages.push(PageSpec {
                page_number: page.page_number,
                region_key: page.region,
                indicator_a,
                indicator_b,
            });
        }

        let mut records = Vec::with_capacity(raw.records.len());
        for (idx, record) in raw.records.into_iter().enumerate() {
            let identity = record
                .name
                .clone()
                .unwrap_or_else(|| format!("#{}", idx + 1));
            let Some(region) = record.region else {
                return Err(MapBookError::data(
                    None,
                    Some(identity),
                    "record has no region",
                ));
            };
            let Some(name) = record.name else {
                return Err(MapBookError::data(
                    None,
                    Some(identity),
                    format!("record in {} has no name", region),
                ));
            };
            let value = record.value.as_ref().and_then(number_field).ok_or_else(|| {
                MapBookError::data(
                    None,
                    Some(identity.clone()),
                    format!("value in {} is missing or not a number", region),
                )
            })?;
            records.push(RegionRecord {
                region,
                record: Record { label: name, value },
            });
        }

        Ok(Self { pages, records })
    }

    pub fn load(path: &Path) -> Result<Self, MapBookError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn number_field(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

impl RecordSource for JsonDataSource {
    fn select_records(
        &self,
        region_key: &str,
        predicate: &Predicate,
    ) -> Result<RecordSet, MapBookError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.region == region_key && predicate.matches(&r.region, r.record.value))
            .map(|r| r.record.clone())
            .collect())
    }
}

impl PageSource for JsonDataSource {
    fn page_list(&self) -> Result<Vec<PageSpec>, MapBookError> {
        Ok(self.pages.clone())
    }

    fn page_count(&self) -> Result<usize, MapBookError> {
        Ok(self.pages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::QueryFields;

    const SAMPLE: &str = r#"{
        "pages": [
            {"page_number": 1, "region": "Texas", "indicator_a": 32.0, "indicator_b": 37.6},
            {"page_number": 2, "region": "Utah", "indicator_a": 9.0, "indicator_b": 13.0}
        ],
        "records": [
            {"region": "Texas", "name": "Harris", "value": 128.4},
            {"region": "Texas", "name": "Loving", "value": 40},
            {"region": "Utah", "name": "Utah County", "value": 210.0}
        ]
    }"#;

    fn predicate(region: &str) -> Predicate {
        Predicate {
            fields: QueryFields::default(),
            region: region.to_string(),
            threshold: 100.0,
        }
    }

    #[test]
    fn pages_are_returned_in_page_order() {
        let source = JsonDataSource::from_json_str(SAMPLE).unwrap();
        let pages = source.page_list().unwrap();
        assert_eq!(source.page_count().unwrap(), 2);
        assert_eq!(pages[0].region_key, "Texas");
        assert_eq!(pages[0].indicator_b, 37.6);
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(source.record_count(), 3);
    }

    #[test]
    fn page_list_keeps_file_order() {
        let json = r#"{
            "pages": [
                {"page_number": 2, "region": "Utah", "indicator_a": 9.0, "indicator_b": 13.0},
                {"page_number": 1, "region": "Texas", "indicator_a": 32.0, "indicator_b": 37.6}
            ],
            "records": []
        }"#;
        let source = JsonDataSource::from_json_str(json).unwrap();
        let pages = source.page_list().unwrap();
        assert_eq!(pages[0].region_key, "Utah");
        let err = crate::records::validate_page_list(&pages).unwrap_err();
        assert!(matches!(err, MapBookError::Data { page: Some(2), .. }));
    }

    #[test]
    fn selection_applies_the_predicate() {
        let source = JsonDataSource::from_json_str(SAMPLE).unwrap();
        let texas = source.select_records("Texas", &predicate("Texas")).unwrap();
        assert_eq!(texas.len(), 1);
        assert_eq!(texas.iter().next().unwrap().label, "Harris");
        let none = source.select_records("Ohio", &predicate("Ohio")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn string_values_are_not_coerced() {
        let json = r#"{
            "pages": [],
            "records": [{"region": "Texas", "name": "Harris", "value": "128.4"}]
        }"#;
        match JsonDataSource::from_json_str(json) {
            Err(MapBookError::Data { record, message, .. }) => {
                assert_eq!(record.as_deref(), Some("Harris"));
                assert!(message.contains("not a number"));
            }
            other => panic!("expected data error, got {other:?}"),
        }
    }

    #[test]
    fn missing_fields_name_the_record() {
        let json = r#"{"pages": [], "records": [{"region": "Texas", "value": 1.0}]}"#;
        let err = JsonDataSource::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("#1"));

        let json = r#"{"pages": [{"page_number": 4, "region": "Iowa", "indicator_a": null, "indicator_b": 1}]}"#;
        let err = JsonDataSource::from_json_str(json).unwrap_err();
        assert_eq!(err.page(), Some(4));
    }
}
