//! Row-oriented access to Google Sheets used as an ad-hoc database.
//!
//! The transport is hidden behind the object-safe [`SheetsApi`] trait so the
//! data layer can be exercised against an in-memory fake in tests. The
//! production implementation, [`SheetsClient`], talks to the Sheets v4 REST
//! API with a pre-issued bearer token; acquiring that token is the
//! deployment's problem, not ours.
//!
//! [`SheetRowStore`] layers CRUD-by-row-id semantics on top: rows are
//! addressed by the value of an id column, and a fetched range is indexed by
//! id once per operation so a row position is only computed at the moment a
//! write needs an A1 range.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Identifies one tabular range used as a database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl SheetRef {
    #[must_use]
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }
}

/// Low-level spreadsheet operations, one method per remote call.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Fetches a value range. Missing trailing cells are simply absent from
    /// the returned rows.
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrites the cells starting at `range` with `values` (RAW input).
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Appends `values` after the last data row of `range`. The exact
    /// insertion point is server-determined.
    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Structurally deletes rows `[start_index, end_index)` (0-based);
    /// following rows shift up.
    async fn delete_rows(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        start_index: usize,
        end_index: usize,
    ) -> Result<()>;

    /// Resolves a sheet name to its internal sheet id, `None` if the
    /// spreadsheet has no sheet with that title.
    async fn resolve_sheet_id(&self, spreadsheet_id: &str, sheet_name: &str)
    -> Result<Option<i64>>;
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Cells arrive as JSON strings under the default render option, but a
/// manually-edited sheet can still hand back bare numbers or booleans.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sheets v4 REST client authenticated with a bearer token.
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    #[must_use]
    pub fn new(access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SHEETS_API_BASE.to_string(),
            access_token,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Sheets(format!("{status}: {body}")))
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{}/{}/values/{}", self.base_url, spreadsheet_id, range);
        debug!(url = %url, "Fetching value range");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let value_range: ValueRange = Self::check(response).await?.json().await?;

        let rows = value_range
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect::<Vec<Vec<String>>>();
        debug!(count = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}?valueInputOption=RAW",
            self.base_url, spreadsheet_id, range
        );
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "values": values }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.base_url, spreadsheet_id, range
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "values": values }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_rows(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        start_index: usize,
        end_index: usize,
    ) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", self.base_url, spreadsheet_id);
        let body = serde_json::json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": start_index,
                        "endIndex": end_index,
                    }
                }
            }]
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn resolve_sheet_id(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<Option<i64>> {
        let url = format!(
            "{}/{}?fields=sheets.properties",
            self.base_url, spreadsheet_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let meta: SpreadsheetMeta = Self::check(response).await?.json().await?;

        Ok(meta
            .sheets
            .iter()
            .find(|sheet| sheet.properties.title == sheet_name)
            .map(|sheet| sheet.properties.sheet_id))
    }
}

/// A fetched range indexed by the value of one column.
///
/// Positions are derived from this snapshot and handed straight to the write
/// that needs them; they are never retained across await points, since a
/// structural delete shifts every following row.
struct RowSet {
    rows: Vec<Vec<String>>,
}

impl RowSet {
    fn position_of(&self, id_column: usize, id_value: &str) -> Option<usize> {
        // Exact comparison after coercion to string: no trimming, no
        // case-folding. Rows shorter than the id column never match.
        self.rows
            .iter()
            .position(|row| row.get(id_column).map(String::as_str) == Some(id_value))
    }

    fn row_by_id(&self, id_column: usize, id_value: &str) -> Option<&Vec<String>> {
        self.position_of(id_column, id_value)
            .map(|index| &self.rows[index])
    }
}

/// CRUD-by-row-id over one sheet used as a table.
pub struct SheetRowStore {
    api: Arc<dyn SheetsApi>,
}

impl SheetRowStore {
    #[must_use]
    pub fn new(api: Arc<dyn SheetsApi>) -> Self {
        Self { api }
    }

    async fn fetch(&self, sheet: &SheetRef) -> Result<RowSet> {
        let rows = self
            .api
            .get_values(&sheet.spreadsheet_id, &sheet.sheet_name)
            .await?;
        Ok(RowSet { rows })
    }

    /// Fetches the full rectangular range of the sheet.
    #[instrument(skip(self))]
    pub async fn read_all(&self, sheet: &SheetRef) -> Result<Vec<Vec<String>>> {
        Ok(self.fetch(sheet).await?.rows)
    }

    /// Position (0-based) of the first row whose cell at `id_column`
    /// stringwise-equals `id_value`.
    #[instrument(skip(self))]
    pub async fn find_row_index(
        &self,
        sheet: &SheetRef,
        id_column: usize,
        id_value: &str,
    ) -> Result<Option<usize>> {
        Ok(self.fetch(sheet).await?.position_of(id_column, id_value))
    }

    /// First row matching `id_value` at `id_column`, if any.
    #[instrument(skip(self))]
    pub async fn read_row_by_id(
        &self,
        sheet: &SheetRef,
        id_column: usize,
        id_value: &str,
    ) -> Result<Option<Vec<String>>> {
        Ok(self
            .fetch(sheet)
            .await?
            .row_by_id(id_column, id_value)
            .cloned())
    }

    /// Appends `row` after the last data row of the sheet.
    #[instrument(skip(self, row))]
    pub async fn create_row(&self, sheet: &SheetRef, row: Vec<String>) -> Result<()> {
        self.api
            .append_values(&sheet.spreadsheet_id, &sheet.sheet_name, vec![row])
            .await?;
        info!(sheet = %sheet.sheet_name, "Appended row");
        Ok(())
    }

    /// Overwrites the full cell range of the row matching `id_value`.
    /// Returns `Ok(false)` when no row matches.
    #[instrument(skip(self, new_row))]
    pub async fn update_row_by_id(
        &self,
        sheet: &SheetRef,
        id_column: usize,
        id_value: &str,
        new_row: Vec<String>,
    ) -> Result<bool> {
        let Some(row_index) = self.find_row_index(sheet, id_column, id_value).await? else {
            warn!(id = id_value, "No row to update");
            return Ok(false);
        };

        // A1 notation is 1-based
        let range = format!("{}!A{}", sheet.sheet_name, row_index + 1);
        self.api
            .update_values(&sheet.spreadsheet_id, &range, vec![new_row])
            .await?;
        info!(id = id_value, range = %range, "Updated row");
        Ok(true)
    }

    /// Structurally deletes the row matching `id_value`; all following rows
    /// shift up by one. Returns `Ok(false)` when no row matches or the sheet
    /// name cannot be resolved to an internal sheet id.
    #[instrument(skip(self))]
    pub async fn delete_row_by_id(
        &self,
        sheet: &SheetRef,
        id_column: usize,
        id_value: &str,
    ) -> Result<bool> {
        let Some(row_index) = self.find_row_index(sheet, id_column, id_value).await? else {
            warn!(id = id_value, "No row to delete");
            return Ok(false);
        };

        let Some(sheet_id) = self
            .api
            .resolve_sheet_id(&sheet.spreadsheet_id, &sheet.sheet_name)
            .await?
        else {
            warn!(sheet = %sheet.sheet_name, "Sheet not found in spreadsheet");
            return Ok(false);
        };

        self.api
            .delete_rows(&sheet.spreadsheet_id, sheet_id, row_index, row_index + 1)
            .await?;
        info!(id = id_value, row_index, "Deleted row");
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod test_api {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory stand-in for the remote spreadsheet. One spreadsheet, any
    /// number of named sheets; ranges of the form `Name` or `Name!A<row>`.
    #[derive(Default)]
    pub struct FakeSheetsApi {
        sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
        fail: AtomicBool,
    }

    impl FakeSheetsApi {
        pub fn with_sheet(name: &str, rows: Vec<Vec<&str>>) -> Self {
            let api = Self::default();
            api.sheets.lock().unwrap().insert(
                name.to_string(),
                rows.into_iter()
                    .map(|row| row.into_iter().map(str::to_string).collect())
                    .collect(),
            );
            api
        }

        /// Adds (or replaces) a named sheet. Test setup only.
        pub fn insert_sheet(&self, name: &str, rows: Vec<Vec<&str>>) {
            self.sheets.lock().unwrap().insert(
                name.to_string(),
                rows.into_iter()
                    .map(|row| row.into_iter().map(str::to_string).collect())
                    .collect(),
            );
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        pub fn rows(&self, name: &str) -> Vec<Vec<String>> {
            self.sheets
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default()
        }

        fn check_up(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Sheets("503: transport down".to_string()));
            }
            Ok(())
        }

        fn split_range(range: &str) -> (String, Option<usize>) {
            match range.split_once('!') {
                Some((name, cell)) => {
                    let row_number = cell
                        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                        .parse::<usize>()
                        .ok();
                    (name.to_string(), row_number)
                }
                None => (range.to_string(), None),
            }
        }

        /// Sheet ids are assigned from the sheet's position in sorted name
        /// order, which is stable enough for tests.
        fn sheet_id_of(&self, name: &str) -> Option<i64> {
            let sheets = self.sheets.lock().unwrap();
            let mut names: Vec<&String> = sheets.keys().collect();
            names.sort();
            names
                .iter()
                .position(|n| n.as_str() == name)
                .map(|position| position as i64)
        }

        fn name_of_sheet_id(&self, sheet_id: i64) -> Option<String> {
            let sheets = self.sheets.lock().unwrap();
            let mut names: Vec<String> = sheets.keys().cloned().collect();
            names.sort();
            names.get(sheet_id as usize).cloned()
        }
    }

    #[async_trait]
    impl SheetsApi for FakeSheetsApi {
        async fn get_values(
            &self,
            _spreadsheet_id: &str,
            range: &str,
        ) -> Result<Vec<Vec<String>>> {
            self.check_up()?;
            let (name, _) = Self::split_range(range);
            Ok(self.rows(&name))
        }

        async fn update_values(
            &self,
            _spreadsheet_id: &str,
            range: &str,
            values: Vec<Vec<String>>,
        ) -> Result<()> {
            self.check_up()?;
            let (name, row_number) = Self::split_range(range);
            let row_number =
                row_number.ok_or_else(|| Error::Sheets("update needs a cell range".to_string()))?;
            let mut sheets = self.sheets.lock().unwrap();
            let rows = sheets.entry(name).or_default();
            if rows.len() < row_number {
                rows.resize(row_number, Vec::new());
            }
            rows[row_number - 1] = values
                .into_iter()
                .next()
                .ok_or_else(|| Error::Sheets("empty update body".to_string()))?;
            Ok(())
        }

        async fn append_values(
            &self,
            _spreadsheet_id: &str,
            range: &str,
            values: Vec<Vec<String>>,
        ) -> Result<()> {
            self.check_up()?;
            let (name, _) = Self::split_range(range);
            self.sheets
                .lock()
                .unwrap()
                .entry(name)
                .or_default()
                .extend(values);
            Ok(())
        }

        async fn delete_rows(
            &self,
            _spreadsheet_id: &str,
            sheet_id: i64,
            start_index: usize,
            end_index: usize,
        ) -> Result<()> {
            self.check_up()?;
            let name = self
                .name_of_sheet_id(sheet_id)
                .ok_or_else(|| Error::Sheets(format!("unknown sheetId {sheet_id}")))?;
            let mut sheets = self.sheets.lock().unwrap();
            let rows = sheets.get_mut(&name).expect("sheet exists");
            rows.drain(start_index..end_index.min(rows.len()));
            Ok(())
        }

        async fn resolve_sheet_id(
            &self,
            _spreadsheet_id: &str,
            sheet_name: &str,
        ) -> Result<Option<i64>> {
            self.check_up()?;
            Ok(self.sheet_id_of(sheet_name))
        }
    }
}
