//! Data access layer over the guild spreadsheets.
//!
//! The `DataManager` owns the row store, the caches and the per-member
//! locks. It is constructed once at process start and injected into the
//! command handlers; nothing here is global state.
//!
//! Error policy at this boundary: transport failures talking to the
//! spreadsheet backend are logged and turned into failure sentinels
//! (`None`/`false`), which the command layer answers with a generic
//! user-facing error. A missing row is a normal negative result, not a
//! failure.

use crate::cache::TtlCache;
use crate::errors::Result;
use crate::models::{COL_MEMBER_ID, MemberRecord, PassagesTable};
use crate::sheets::{SheetRef, SheetRowStore, SheetsApi};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

/// Cache key for the whole passage pricing table.
const PASSAGES_CACHE_KEY: &str = "passages_data";

fn member_cache_key(member_id: &str) -> String {
    format!("member_{member_id}")
}

/// Result of an atomic Ch'ton transfer.
#[derive(Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed {
        giver_balance: i64,
        receiver_balance: i64,
    },
    InsufficientFunds {
        balance: i64,
    },
}

pub struct DataManager {
    store: SheetRowStore,
    members_sheet: SheetRef,
    passages_sheet: SheetRef,
    member_cache: RwLock<TtlCache<Vec<String>>>,
    passages_cache: RwLock<TtlCache<Arc<PassagesTable>>>,
    /// One async mutex per member id; every roster write goes through the
    /// member's lock so read-modify-write sequences cannot interleave.
    member_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DataManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn SheetsApi>,
        members_sheet: SheetRef,
        passages_sheet: SheetRef,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store: SheetRowStore::new(api),
            members_sheet,
            passages_sheet,
            member_cache: RwLock::new(TtlCache::new(cache_ttl)),
            passages_cache: RwLock::new(TtlCache::new(cache_ttl)),
            member_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn member_lock(&self, member_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.member_locks.lock().await;
        Arc::clone(
            locks
                .entry(member_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // ---------- member roster ----------

    /// Fetches a member's row, serving from cache when fresh.
    #[instrument(skip(self))]
    pub async fn get_member(&self, member_id: &str) -> Option<MemberRecord> {
        let key = member_cache_key(member_id);
        if let Some(row) = self.member_cache.read().await.get(&key) {
            return Some(MemberRecord::from_row(row.clone()));
        }

        match self
            .store
            .read_row_by_id(&self.members_sheet, COL_MEMBER_ID, member_id)
            .await
        {
            Ok(Some(row)) => {
                self.member_cache.write().await.set(key, row.clone());
                Some(MemberRecord::from_row(row))
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to fetch member {member_id}: {e}");
                None
            }
        }
    }

    /// Writes a member's row (update if present, append otherwise) and
    /// synchronously invalidates its cache entry. Returns `false` on
    /// backend failure.
    #[instrument(skip(self, record))]
    pub async fn save_member(&self, record: MemberRecord) -> bool {
        let member_id = record.id().to_string();
        let lock = self.member_lock(&member_id).await;
        let _guard = lock.lock().await;
        self.write_member_row(&member_id, record.into_row()).await
    }

    /// The write itself, without taking the member lock. Callers must hold it.
    async fn write_member_row(&self, member_id: &str, row: Vec<String>) -> bool {
        let result = self.upsert_row(member_id, row).await;
        // Invalidate before anyone can observe the old value, even when the
        // write failed: a retry must not be served a stale row.
        self.member_cache
            .write()
            .await
            .invalidate(&member_cache_key(member_id));

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save member {member_id}: {e}");
                false
            }
        }
    }

    async fn upsert_row(&self, member_id: &str, row: Vec<String>) -> Result<()> {
        let updated = self
            .store
            .update_row_by_id(&self.members_sheet, COL_MEMBER_ID, member_id, row.clone())
            .await?;
        if !updated {
            self.store.create_row(&self.members_sheet, row).await?;
            info!("Created roster row for member {member_id}");
        }
        Ok(())
    }

    /// Removes a member's row. `false` when the row was absent or the
    /// backend failed.
    #[instrument(skip(self))]
    pub async fn delete_member(&self, member_id: &str) -> bool {
        let lock = self.member_lock(member_id).await;
        let _guard = lock.lock().await;

        let result = self
            .store
            .delete_row_by_id(&self.members_sheet, COL_MEMBER_ID, member_id)
            .await;
        self.member_cache
            .write()
            .await
            .invalidate(&member_cache_key(member_id));

        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                error!("Failed to delete member {member_id}: {e}");
                false
            }
        }
    }

    /// Roster-sync write path: updates a row keyed by a caller-resolved id
    /// column (the sheet's header may order columns differently).
    #[instrument(skip(self, row))]
    pub async fn update_roster_row(
        &self,
        id_column: usize,
        member_id: &str,
        row: Vec<String>,
    ) -> bool {
        let lock = self.member_lock(member_id).await;
        let _guard = lock.lock().await;

        let result = self
            .store
            .update_row_by_id(&self.members_sheet, id_column, member_id, row)
            .await;
        self.member_cache
            .write()
            .await
            .invalidate(&member_cache_key(member_id));

        match result {
            Ok(updated) => updated,
            Err(e) => {
                error!("Failed to update roster row for {member_id}: {e}");
                false
            }
        }
    }

    /// All raw roster rows, header included. `None` on backend failure.
    pub async fn read_member_rows(&self) -> Option<Vec<Vec<String>>> {
        match self.store.read_all(&self.members_sheet).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!("Failed to read member roster: {e}");
                None
            }
        }
    }

    /// Atomically moves `amount` Ch'tons from `giver_id` to `receiver_id`.
    ///
    /// Both members' locks are held for the whole read-check-write sequence,
    /// acquired in sorted-id order so two opposite transfers cannot
    /// deadlock. A receiver without a roster row gets one created with the
    /// transferred amount. Returns `None` on backend failure.
    ///
    /// The caller validates `amount > 0` and `giver_id != receiver_id`
    /// before any state is touched.
    #[instrument(skip(self, receiver_nickname))]
    pub async fn transfer_chtons(
        &self,
        giver_id: &str,
        receiver_id: &str,
        receiver_nickname: &str,
        amount: i64,
    ) -> Option<TransferOutcome> {
        debug_assert!(amount > 0);
        debug_assert_ne!(giver_id, receiver_id);

        let (first, second) = if giver_id < receiver_id {
            (giver_id, receiver_id)
        } else {
            (receiver_id, giver_id)
        };
        let first_lock = self.member_lock(first).await;
        let second_lock = self.member_lock(second).await;
        let _first_guard = first_lock.lock().await;
        let _second_guard = second_lock.lock().await;

        // A giver without a row simply has nothing to give.
        let mut giver = match self.get_member(giver_id).await {
            Some(record) => record,
            None => MemberRecord::new(giver_id, "", ""),
        };
        let giver_balance = giver.chtons();
        if giver_balance < amount {
            warn!(
                "Member {giver_id} tried to give {amount} Ch'tons with only {giver_balance}"
            );
            return Some(TransferOutcome::InsufficientFunds {
                balance: giver_balance,
            });
        }

        let mut receiver = match self.get_member(receiver_id).await {
            Some(record) => record,
            // Implicit entity creation on first write
            None => MemberRecord::new(receiver_id, receiver_nickname, "Membre"),
        };

        giver.set_chtons(giver_balance - amount);
        receiver.set_chtons(receiver.chtons() + amount);
        let giver_balance = giver.chtons();
        let receiver_balance = receiver.chtons();

        // Debit first: if the credit then fails, Ch'tons go missing rather
        // than getting minted, and the log has the full story.
        if !self.write_member_row(giver_id, giver.into_row()).await {
            return None;
        }
        if !self.write_member_row(receiver_id, receiver.into_row()).await {
            error!(
                "Transfer half-applied: debited {amount} from {giver_id} but failed to credit {receiver_id}"
            );
            return None;
        }

        info!("Transferred {amount} Ch'tons from {giver_id} to {receiver_id}");
        Some(TransferOutcome::Completed {
            giver_balance,
            receiver_balance,
        })
    }

    // ---------- passage pricing table ----------

    /// Loads the passage pricing table, serving from cache unless `force`.
    ///
    /// The cache entry is only ever replaced wholesale, here; member writes
    /// do not touch it. Returns `false` when the backend failed or the
    /// sheet came back empty.
    #[instrument(skip(self))]
    pub async fn load_passages(&self, force: bool) -> bool {
        if !force
            && self
                .passages_cache
                .read()
                .await
                .get(PASSAGES_CACHE_KEY)
                .is_some()
        {
            return true;
        }

        let rows = match self.store.read_all(&self.passages_sheet).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to load passage data: {e}");
                return false;
            }
        };

        let table = PassagesTable::from_rows(&rows);
        if table.is_empty() {
            error!("Passage sheet returned no usable rows");
            return false;
        }

        info!("Passage data loaded: {} bosses", table.len());
        self.passages_cache
            .write()
            .await
            .set(PASSAGES_CACHE_KEY, Arc::new(table));
        true
    }

    /// Current pricing table, loading it on a cache miss.
    pub async fn passages(&self) -> Option<Arc<PassagesTable>> {
        if let Some(table) = self.passages_cache.read().await.get(PASSAGES_CACHE_KEY) {
            return Some(Arc::clone(table));
        }
        if !self.load_passages(false).await {
            return None;
        }
        self.passages_cache
            .read()
            .await
            .get(PASSAGES_CACHE_KEY)
            .map(Arc::clone)
    }

    /// Boss names for autocomplete, in sheet order.
    pub async fn boss_names(&self) -> Vec<String> {
        match self.passages().await {
            Some(table) => table.boss_names().map(str::to_string).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::test_api::FakeSheetsApi;

    const MEMBERS: &str = "Membres";
    const PASSAGES: &str = "Passages";

    fn manager_fixture() -> (Arc<FakeSheetsApi>, DataManager) {
        let api = Arc::new(FakeSheetsApi::with_sheet(
            MEMBERS,
            vec![
                vec!["ID Discord", "Pseudo sur serveur Discord", "Rôle", "Ch'tons"],
                vec!["100", "Auto", "Membre de guilde", "100"],
                vec!["200", "Iru", "Resident premium", "0"],
            ],
        ));
        let manager = DataManager::new(
            Arc::clone(&api) as Arc<dyn SheetsApi>,
            SheetRef::new("spreadsheet", MEMBERS),
            SheetRef::new("spreadsheet", PASSAGES),
            Duration::from_secs(3600),
        );
        (api, manager)
    }

    fn seed_passages(api: &FakeSheetsApi) {
        api.insert_sheet(
            PASSAGES,
            vec![
                vec!["Boss", "Icone", "Succès", "Prix (kamas)", "Prix (coins)", "Passeurs"],
                vec!["Wa Wabbit", "🐰", "Succès A", "500k", "10", "Auto, Iru"],
            ],
        );
    }

    #[tokio::test]
    async fn test_get_member_reads_and_caches() {
        let (api, manager) = manager_fixture();

        let member = manager.get_member("100").await.expect("member exists");
        assert_eq!(member.nickname(), "Auto");
        assert_eq!(member.chtons(), 100);

        // Mutate the backend behind the cache's back: the cached row is
        // served until the entry is invalidated.
        api.set_failing(true);
        let cached = manager.get_member("100").await.expect("served from cache");
        assert_eq!(cached.chtons(), 100);
    }

    #[tokio::test]
    async fn test_get_member_missing_is_none_and_failure_is_none() {
        let (api, manager) = manager_fixture();
        assert!(manager.get_member("999").await.is_none());

        api.set_failing(true);
        assert!(manager.get_member("100").await.is_none());
    }

    #[tokio::test]
    async fn test_save_member_invalidates_before_next_read() {
        let (_, manager) = manager_fixture();

        // Warm the cache
        let mut member = manager.get_member("100").await.unwrap();
        member.set_chtons(42);
        assert!(manager.save_member(member).await);

        // Read-after-write observes the new balance
        assert_eq!(manager.get_member("100").await.unwrap().chtons(), 42);
    }

    #[tokio::test]
    async fn test_save_member_creates_row_implicitly() {
        let (api, manager) = manager_fixture();
        let record = MemberRecord::new("300", "Krakoukas", "Membre");
        assert!(manager.save_member(record).await);

        let rows = api.rows(MEMBERS);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3][0], "300");
        assert_eq!(manager.get_member("300").await.unwrap().nickname(), "Krakoukas");
    }

    #[tokio::test]
    async fn test_delete_member_removes_row_once() {
        let (api, manager) = manager_fixture();
        assert!(manager.delete_member("100").await);
        assert_eq!(api.rows(MEMBERS).len(), 2);
        assert!(manager.get_member("100").await.is_none());

        // Second delete with the same id is a failing no-op
        assert!(!manager.delete_member("100").await);
        assert_eq!(api.rows(MEMBERS).len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_moves_balance() {
        let (_, manager) = manager_fixture();
        let outcome = manager.transfer_chtons("100", "200", "Iru", 40).await;
        assert_eq!(
            outcome,
            Some(TransferOutcome::Completed {
                giver_balance: 60,
                receiver_balance: 40,
            })
        );
        assert_eq!(manager.get_member("100").await.unwrap().chtons(), 60);
        assert_eq!(manager.get_member("200").await.unwrap().chtons(), 40);
    }

    #[tokio::test]
    async fn test_transfer_rejects_insufficient_funds_without_mutation() {
        let (api, manager) = manager_fixture();
        let before = api.rows(MEMBERS);

        let outcome = manager.transfer_chtons("100", "200", "Iru", 999).await;
        assert_eq!(
            outcome,
            Some(TransferOutcome::InsufficientFunds { balance: 100 })
        );
        assert_eq!(api.rows(MEMBERS), before);
    }

    #[tokio::test]
    async fn test_transfer_creates_missing_receiver() {
        let (api, manager) = manager_fixture();
        let outcome = manager.transfer_chtons("100", "400", "Meilleur", 30).await;
        assert_eq!(
            outcome,
            Some(TransferOutcome::Completed {
                giver_balance: 70,
                receiver_balance: 30,
            })
        );
        let rows = api.rows(MEMBERS);
        let created = rows.iter().find(|row| row[0] == "400").expect("row created");
        assert_eq!(created[1], "Meilleur");
        assert_eq!(created[3], "30");
    }

    #[tokio::test]
    async fn test_transfer_backend_failure_is_none() {
        let (api, manager) = manager_fixture();
        api.set_failing(true);
        assert!(manager.transfer_chtons("100", "200", "Iru", 10).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_transfers_do_not_lose_updates() {
        let (_, manager) = manager_fixture();
        let manager = Arc::new(manager);

        let a = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.transfer_chtons("100", "200", "Iru", 40).await })
        };
        let b = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.transfer_chtons("100", "200", "Iru", 40).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(matches!(a, Some(TransferOutcome::Completed { .. })));
        assert!(matches!(b, Some(TransferOutcome::Completed { .. })));
        // 100 - 40 - 40: both debits land, neither overwrites the other
        assert_eq!(manager.get_member("100").await.unwrap().chtons(), 20);
        assert_eq!(manager.get_member("200").await.unwrap().chtons(), 80);
    }

    #[tokio::test]
    async fn test_load_passages_populates_cache_and_serves_table() {
        let (api, manager) = manager_fixture();
        seed_passages(&api);

        assert!(manager.load_passages(false).await);
        let table = manager.passages().await.expect("table loaded");
        assert!(table.find_boss("wa wabbit").is_some());
        assert_eq!(manager.boss_names().await, vec!["Wa Wabbit".to_string()]);

        // Cached: a backend outage does not evict the table
        api.set_failing(true);
        assert!(manager.load_passages(false).await);
        assert!(manager.passages().await.is_some());
    }

    #[tokio::test]
    async fn test_load_passages_failure_and_empty_sheet() {
        let (api, manager) = manager_fixture();

        // Empty sheet: nothing usable
        assert!(!manager.load_passages(false).await);
        assert!(manager.passages().await.is_none());

        api.set_failing(true);
        assert!(!manager.load_passages(true).await);
    }

    #[tokio::test]
    async fn test_member_writes_leave_passages_cache_alone() {
        let (api, manager) = manager_fixture();
        seed_passages(&api);
        assert!(manager.load_passages(false).await);

        let mut member = manager.get_member("100").await.unwrap();
        member.set_chtons(1);
        assert!(manager.save_member(member).await);

        // Reference data survives member writes by design
        api.set_failing(true);
        assert!(manager.passages().await.is_some());
    }
}
