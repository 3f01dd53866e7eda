//! Domain views over raw spreadsheet rows.
//!
//! The sheets have no typed schema: a row is an ordered list of string
//! cells, positionally mapped to columns. These types give the rest of the
//! crate named accessors instead of bare indices, and do the parse-at-use
//! conversions (balances are stored as strings in the sheet).

/// Member roster column positions (fallbacks when the header row is absent
/// or does not carry the expected names).
pub const COL_MEMBER_ID: usize = 0;
pub const COL_NICKNAME: usize = 1;
pub const COL_ROLE: usize = 2;
pub const COL_CHTONS: usize = 3;

/// Header names used by the roster sheet.
pub const HEADER_MEMBER_ID: &str = "ID Discord";
pub const HEADER_NICKNAME: &str = "Pseudo sur serveur Discord";
pub const HEADER_ROLE: &str = "Rôle";

/// Resolves a column by header name, falling back to a fixed position when
/// the header row does not contain it.
#[must_use]
pub fn resolve_column(headers: &[String], name: &str, fallback: usize) -> usize {
    headers
        .iter()
        .position(|header| header == name)
        .unwrap_or(fallback)
}

/// One row of the member roster: `[discord id, nickname, role label, balance]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    cells: Vec<String>,
}

impl MemberRecord {
    /// A fresh record for a member who just joined. The balance column is
    /// left absent; it reads as 0 until the first credit.
    #[must_use]
    pub fn new(id: impl Into<String>, nickname: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            cells: vec![id.into(), nickname.into(), role.into()],
        }
    }

    #[must_use]
    pub fn from_row(cells: Vec<String>) -> Self {
        Self { cells }
    }

    #[must_use]
    pub fn into_row(self) -> Vec<String> {
        self.cells
    }

    fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map_or("", String::as_str)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.cell(COL_MEMBER_ID)
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        self.cell(COL_NICKNAME)
    }

    #[must_use]
    pub fn role(&self) -> &str {
        self.cell(COL_ROLE)
    }

    /// Balance, parsed at point of use. Absent or unparsable cells read as 0.
    #[must_use]
    pub fn chtons(&self) -> i64 {
        self.cell(COL_CHTONS).trim().parse().unwrap_or(0)
    }

    /// Overwrites the balance cell, growing the row if it was short.
    pub fn set_chtons(&mut self, amount: i64) {
        if self.cells.len() <= COL_CHTONS {
            self.cells.resize(COL_CHTONS + 1, String::new());
        }
        self.cells[COL_CHTONS] = amount.to_string();
    }
}

/// Pricing of one success tier of a boss passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessEntry {
    pub name: String,
    /// Kamas price as written in the sheet: "2m5", "500k" or the "flemme"
    /// sentinel meaning the success is not offered.
    pub kamas_price: String,
    /// Ch'ton price as written in the sheet (integer string).
    pub chton_price: String,
    /// Comma-joined passeur pseudos.
    pub passeurs: String,
}

impl SuccessEntry {
    #[must_use]
    pub fn passeur_list(&self) -> Vec<&str> {
        self.passeurs
            .split(", ")
            .filter(|pseudo| !pseudo.is_empty())
            .collect()
    }
}

/// All success tiers of one boss, in sheet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossEntry {
    pub name: String,
    /// Emote or "placeholder" when the sheet has none.
    pub icon: String,
    pub successes: Vec<SuccessEntry>,
}

impl BossEntry {
    /// Case-insensitive success lookup (success names are human-typed).
    #[must_use]
    pub fn find_success(&self, name: &str) -> Option<&SuccessEntry> {
        let wanted = name.to_lowercase();
        self.successes
            .iter()
            .find(|success| success.name.to_lowercase() == wanted)
    }
}

/// The boss/passage pricing table, parsed from the passages sheet.
///
/// Bosses appear in first-seen sheet order; successes keep their row order,
/// so "the first success of a boss" is well-defined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassagesTable {
    bosses: Vec<BossEntry>,
}

impl PassagesTable {
    /// Parses the raw sheet rows. The first row is the header; a data row
    /// needs at least 6 cells (boss, icon, success, kamas price, chton
    /// price, passeurs) to count, anything shorter is ignored.
    #[must_use]
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        let mut table = Self::default();

        for row in rows.iter().skip(1) {
            if row.len() <= 5 {
                continue;
            }

            let boss_name = &row[0];
            let index = table
                .bosses
                .iter()
                .position(|boss| &boss.name == boss_name)
                .unwrap_or_else(|| {
                    table.bosses.push(BossEntry {
                        name: boss_name.clone(),
                        icon: row[1].clone(),
                        successes: Vec::new(),
                    });
                    table.bosses.len() - 1
                });

            table.bosses[index].successes.push(SuccessEntry {
                name: row[2].clone(),
                kamas_price: row[3].clone(),
                chton_price: row[4].clone(),
                passeurs: row[5].clone(),
            });
        }

        table
    }

    pub fn boss_names(&self) -> impl Iterator<Item = &str> {
        self.bosses.iter().map(|boss| boss.name.as_str())
    }

    /// Case-insensitive boss lookup. Deliberately looser than the row
    /// store's exact id matching: boss names are typed by humans.
    #[must_use]
    pub fn find_boss(&self, name: &str) -> Option<&BossEntry> {
        let wanted = name.to_lowercase();
        self.bosses
            .iter()
            .find(|boss| boss.name.to_lowercase() == wanted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bosses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bosses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passages_rows() -> Vec<Vec<String>> {
        let raw = vec![
            vec!["Boss", "Icone", "Succès", "Prix (kamas)", "Prix (coins)", "Passeurs"],
            vec!["Wa Wabbit", "🐰", "Succès A", "500k", "10", "Auto, Iru"],
            vec!["Wa Wabbit", "🐰", "Duo", "1m2", "25", "Auto"],
            vec!["Ougah", "placeholder", "Succès A", "flemme", "", "Krakoukas"],
            // Short row: a success being filled in, not yet complete
            vec!["Ougah", "placeholder", "Duo"],
        ];
        raw.into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_table_groups_by_boss_in_sheet_order() {
        let table = PassagesTable::from_rows(&passages_rows());
        assert_eq!(table.len(), 2);
        let names: Vec<&str> = table.boss_names().collect();
        assert_eq!(names, vec!["Wa Wabbit", "Ougah"]);

        let wabbit = table.find_boss("Wa Wabbit").unwrap();
        assert_eq!(wabbit.successes.len(), 2);
        assert_eq!(wabbit.successes[0].name, "Succès A");
        assert_eq!(wabbit.successes[1].name, "Duo");
    }

    #[test]
    fn test_short_rows_are_ignored() {
        let table = PassagesTable::from_rows(&passages_rows());
        let ougah = table.find_boss("Ougah").unwrap();
        assert_eq!(ougah.successes.len(), 1);
    }

    #[test]
    fn test_boss_lookup_is_case_insensitive() {
        let table = PassagesTable::from_rows(&passages_rows());
        assert!(table.find_boss("wa wabbit").is_some());
        assert!(table.find_boss("WA WABBIT").is_some());
        assert!(table.find_boss("Comte Harebourg").is_none());
    }

    #[test]
    fn test_success_lookup_and_passeur_list() {
        let table = PassagesTable::from_rows(&passages_rows());
        let wabbit = table.find_boss("Wa Wabbit").unwrap();
        let success = wabbit.find_success("succès a").unwrap();
        assert_eq!(success.passeur_list(), vec!["Auto", "Iru"]);

        let ougah = table.find_boss("Ougah").unwrap();
        assert_eq!(
            ougah.find_success("Succès A").unwrap().passeur_list(),
            vec!["Krakoukas"]
        );
    }

    #[test]
    fn test_empty_sheet_parses_to_empty_table() {
        assert!(PassagesTable::from_rows(&[]).is_empty());
        // Header only
        let header = passages_rows().into_iter().take(1).collect::<Vec<_>>();
        assert!(PassagesTable::from_rows(&header).is_empty());
    }

    #[test]
    fn test_member_record_balance_parses_at_use() {
        let record = MemberRecord::from_row(vec![
            "100".to_string(),
            "Auto".to_string(),
            "Membre de guilde".to_string(),
            "50".to_string(),
        ]);
        assert_eq!(record.chtons(), 50);

        // Short row: balance column absent reads as 0
        let fresh = MemberRecord::new("100", "Auto", "Membre");
        assert_eq!(fresh.chtons(), 0);

        // Garbage reads as 0 rather than crashing a command
        let garbage = MemberRecord::from_row(vec![
            "100".to_string(),
            "Auto".to_string(),
            "Membre".to_string(),
            "beaucoup".to_string(),
        ]);
        assert_eq!(garbage.chtons(), 0);
    }

    #[test]
    fn test_set_chtons_grows_short_rows() {
        let mut record = MemberRecord::new("100", "Auto", "Membre");
        record.set_chtons(40);
        let row = record.into_row();
        assert_eq!(row.len(), 4);
        assert_eq!(row[COL_CHTONS], "40");
    }

    #[test]
    fn test_resolve_column_prefers_header_name() {
        let headers: Vec<String> = vec!["Rôle", "ID Discord", "Pseudo sur serveur Discord"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(resolve_column(&headers, HEADER_MEMBER_ID, COL_MEMBER_ID), 1);
        assert_eq!(resolve_column(&headers, HEADER_ROLE, COL_ROLE), 0);
        // Unknown header falls back to the fixed position
        assert_eq!(resolve_column(&headers, "Ch'tons", COL_CHTONS), 3);
    }
}
