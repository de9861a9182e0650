//! Data bridge: typed series/record tables pushed through the module's
//! dedicated data entry points (values travel as JSON text).

use crate::error::BridgeError;
use crate::marshal::{decode_fault, read_string, with_str, with_str2};
use crate::registry::ManagedObject;
use crate::Result;
use hashbrown::HashMap;
use plotwire_module_api::ChartModule;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SeriesKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub values: Vec<DataValue>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Dimension,
    Measure,
}

/// One table cell. Untagged so plain JSON numbers/strings deserialize
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Number(f64),
    Text(String),
}

impl DataValue {
    fn kind(&self) -> SeriesKind {
        match self {
            DataValue::Number(_) => SeriesKind::Measure,
            DataValue::Text(_) => SeriesKind::Dimension,
        }
    }
}

/// One data row: either a value array in series order, or an object keyed
/// by series name (reordered against the module's series metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Array(Vec<DataValue>),
    Object(HashMap<String, DataValue>),
}

/// Series descriptor as reported by the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<SeriesKind>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Clone)]
pub struct DataBridge {
    module: Rc<dyn ChartModule>,
    chart: Rc<ManagedObject>,
}

impl DataBridge {
    pub fn new(module: Rc<dyn ChartModule>, chart: Rc<ManagedObject>) -> Self {
        Self { module, chart }
    }

    /// Push a whole table: series first, then records reordered against the
    /// freshly updated series metadata.
    pub fn set(&self, data: &DataSet) -> Result<()> {
        for series in &data.series {
            self.add_series(series)?;
        }
        if !data.records.is_empty() {
            let meta = self.meta_info()?;
            for record in &data.records {
                self.add_record(record, &meta)?;
            }
        }
        Ok(())
    }

    /// Series descriptors currently known to the module.
    pub fn meta_info(&self) -> Result<Vec<SeriesInfo>> {
        let chart = self.chart.handle()?;
        let ptr = self
            .module
            .data_meta_info(chart)
            .map_err(|e| decode_fault(&*self.module, e))?;
        let json = read_string(&*self.module, ptr)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn add_series(&self, series: &Series) -> Result<()> {
        let kind = series
            .kind
            .or_else(|| series.values.first().map(DataValue::kind))
            .ok_or_else(|| {
                BridgeError::marshalling(format!(
                    "series '{}' has no type and no values to detect one from",
                    series.name
                ))
            })?;
        let chart = self.chart.handle()?;
        match kind {
            SeriesKind::Dimension => {
                let values: Vec<&str> = series
                    .values
                    .iter()
                    .map(|v| match v {
                        DataValue::Text(s) => Ok(s.as_str()),
                        DataValue::Number(n) => Err(BridgeError::marshalling(format!(
                            "dimension series '{}' contains number {n}",
                            series.name
                        ))),
                    })
                    .collect::<Result<_>>()?;
                let values_json = serde_json::to_string(&values)?;
                with_str2(&self.module, &series.name, &values_json, |name, values| {
                    self.module
                        .data_add_dimension(chart, name, values)
                        .map_err(|e| decode_fault(&*self.module, e))
                })
            }
            SeriesKind::Measure => {
                let values: Vec<f64> = series
                    .values
                    .iter()
                    .map(|v| match v {
                        DataValue::Number(n) => Ok(*n),
                        DataValue::Text(s) => Err(BridgeError::marshalling(format!(
                            "measure series '{}' contains string '{s}'",
                            series.name
                        ))),
                    })
                    .collect::<Result<_>>()?;
                let values_json = serde_json::to_string(&values)?;
                let unit = series.unit.as_deref().unwrap_or("");
                with_str(&self.module, &series.name, |name| {
                    with_str2(&self.module, unit, &values_json, |unit, values| {
                        self.module
                            .data_add_measure(chart, name, unit, values)
                            .map_err(|e| decode_fault(&*self.module, e))
                    })
                })
            }
        }
    }

    fn add_record(&self, record: &Record, meta: &[SeriesInfo]) -> Result<()> {
        let row: Vec<DataValue> = match record {
            Record::Array(values) => values.clone(),
            Record::Object(cells) => meta
                .iter()
                .map(|series| {
                    cells
                        .get(&series.name)
                        .cloned()
                        .unwrap_or_else(|| default_cell(series.kind))
                })
                .collect(),
        };
        let chart = self.chart.handle()?;
        let row_json = serde_json::to_string(&row)?;
        with_str(&self.module, &row_json, |record| {
            self.module
                .data_add_record(chart, record)
                .map_err(|e| decode_fault(&*self.module, e))
        })
    }
}

fn default_cell(kind: Option<SeriesKind>) -> DataValue {
    match kind {
        Some(SeriesKind::Measure) => DataValue::Number(0.0),
        _ => DataValue::Text(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_value_kind_detection() {
        assert_eq!(DataValue::Number(1.0).kind(), SeriesKind::Measure);
        assert_eq!(
            DataValue::Text("Year".into()).kind(),
            SeriesKind::Dimension
        );
    }

    #[test]
    fn dataset_deserializes_from_plain_json() {
        let data: DataSet = serde_json::from_str(
            r#"{
                "series": [
                    {"name": "Year", "values": ["2024", "2025"]},
                    {"name": "Sales", "type": "measure", "unit": "$", "values": [1, 2]}
                ],
                "records": [["2026", 3], {"Year": "2027", "Sales": 4}]
            }"#,
        )
        .unwrap();
        assert_eq!(data.series.len(), 2);
        assert_eq!(data.series[1].kind, Some(SeriesKind::Measure));
        assert!(matches!(data.records[0], Record::Array(_)));
        assert!(matches!(data.records[1], Record::Object(_)));
    }

    #[test]
    fn missing_object_cells_get_typed_defaults() {
        assert_eq!(
            default_cell(Some(SeriesKind::Measure)),
            DataValue::Number(0.0)
        );
        assert_eq!(default_cell(None), DataValue::Text(String::new()));
    }
}
