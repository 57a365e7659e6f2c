use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row from the portal's patient listing. All four fields are required;
/// the extractor drops rows that cannot fill them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encounter {
    pub encounter_date: NaiveDate,
    pub invoice_no: String,
    pub lab_no: String,
    pub src: String,
}

impl Encounter {
    pub fn test_record(&self, test_name: String) -> TestRecord {
        TestRecord {
            encounter_date: self.encounter_date,
            invoice_no: self.invoice_no.clone(),
            lab_no: self.lab_no.clone(),
            src: self.src.clone(),
            test_name,
        }
    }
}

/// One (encounter, test name) pair, the unit of persistence. Field names
/// match the dataset's historic JSON schema, so files written by earlier
/// versions of the fetcher merge cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    #[serde(rename = "EncounterDate")]
    pub encounter_date: NaiveDate,
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: String,
    #[serde(rename = "LabNo")]
    pub lab_no: String,
    #[serde(rename = "Src")]
    pub src: String,
    #[serde(rename = "TestName")]
    pub test_name: String,
}

impl TestRecord {
    /// Uniqueness within the persisted dataset. EncounterDate/InvoiceNo/Src
    /// are carried for display only.
    pub fn dedup_key(&self) -> (String, String) {
        (self.lab_no.clone(), self.test_name.clone())
    }

    /// Rebuild a record from an arbitrary JSON object, keeping only the five
    /// required fields. Returns `None` when any of them is missing, empty,
    /// or (for the date) unparseable; such entries are dropped on load.
    pub fn from_value(value: &Value) -> Option<Self> {
        let field = |name: &str| -> Option<String> {
            value
                .get(name)?
                .as_str()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        let encounter_date = field("EncounterDate")?.parse::<NaiveDate>().ok()?;
        Some(Self {
            encounter_date,
            invoice_no: field("InvoiceNo")?,
            lab_no: field("LabNo")?,
            src: field("Src")?,
            test_name: field("TestName")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_accepts_exact_shape() {
        let value = json!({
            "EncounterDate": "2025-06-01",
            "InvoiceNo": "INV-9",
            "LabNo": "L123",
            "Src": "OPD",
            "TestName": "CBC",
        });
        let record = TestRecord::from_value(&value).unwrap();
        assert_eq!(record.lab_no, "L123");
        assert_eq!(record.encounter_date.to_string(), "2025-06-01");
    }

    #[test]
    fn from_value_repairs_extra_fields() {
        let value = json!({
            "EncounterDate": "2025-06-01",
            "InvoiceNo": "INV-9",
            "LabNo": "L123",
            "Src": "OPD",
            "TestName": "CBC",
            "Stray": "should be discarded",
        });
        let record = TestRecord::from_value(&value).unwrap();
        let round_trip = serde_json::to_value(&record).unwrap();
        assert_eq!(round_trip.as_object().unwrap().len(), 5);
        assert!(round_trip.get("Stray").is_none());
    }

    #[test]
    fn from_value_drops_empty_or_missing_fields() {
        let missing = json!({
            "EncounterDate": "2025-06-01",
            "InvoiceNo": "INV-9",
            "LabNo": "L123",
            "Src": "OPD",
        });
        assert!(TestRecord::from_value(&missing).is_none());

        let empty = json!({
            "EncounterDate": "2025-06-01",
            "InvoiceNo": "INV-9",
            "LabNo": "  ",
            "Src": "OPD",
            "TestName": "CBC",
        });
        assert!(TestRecord::from_value(&empty).is_none());
    }

    #[test]
    fn from_value_drops_bad_dates() {
        let value = json!({
            "EncounterDate": "01-06-2025",
            "InvoiceNo": "INV-9",
            "LabNo": "L123",
            "Src": "OPD",
            "TestName": "CBC",
        });
        assert!(TestRecord::from_value(&value).is_none());
    }

    #[test]
    fn dedup_key_ignores_display_fields() {
        let value = json!({
            "EncounterDate": "2025-06-01",
            "InvoiceNo": "INV-9",
            "LabNo": "L123",
            "Src": "OPD",
            "TestName": "CBC",
        });
        let a = TestRecord::from_value(&value).unwrap();
        let mut b = a.clone();
        b.src = "IPD".to_string();
        b.invoice_no = "INV-10".to_string();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
