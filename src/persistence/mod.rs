// auction_core/src/persistence/mod.rs
//
// The persistence boundary. Two layers:
//
// 1. `Sentinel` — the mmap-backed append-only Write-Ahead Log. Unchanged in
//    mechanism from its original role (header + CRC32'd payload, scanned on
//    open); repurposed here as the backing store for the reconciliation
//    audit log instead of an order-replay journal.
// 2. `PersistenceStore` — the relational sink contract the engines write
//    through, plus `InMemoryStore`, a reference implementation used by the
//    CLI driver and the test suite. A real deployment swaps this for a
//    SQL-backed implementation without touching the engines.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::PersistenceError;
use crate::types::{OrderStatus, Price, Side};

// ---------------------------------------------------------------------------
// Journal Header — #[repr(C)] for zero-copy casting from the mmap buffer.
// ---------------------------------------------------------------------------

/// Every WAL entry begins with this fixed-size header; the payload follows.
///
/// ```text
/// [8: sequence_number][8: timestamp_ns][1: msg_type][4: payload_size][4: crc32]
/// ```
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct JournalHeader {
    pub sequence_number: u64,
    pub timestamp_ns: u64,
    pub msg_type: u8,
    pub payload_size: u32,
    pub crc32: u32,
}

pub const JOURNAL_HEADER_SIZE: usize = std::mem::size_of::<JournalHeader>();
const _: () = assert!(JOURNAL_HEADER_SIZE == 25);

pub mod journal_msg_type {
    pub const RECONCILIATION_LOG: u8 = 0x01;
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub header: JournalHeader,
    pub payload: Vec<u8>,
}

/// Default WAL file size: 64 MB.
pub const DEFAULT_WAL_SIZE: usize = 64 * 1024 * 1024;

/// Mmap-backed sequential append-only log.
pub struct Sentinel {
    mmap: MmapMut,
    write_pos: usize,
    next_seq: u64,
    capacity: usize,
    path: PathBuf,
}

impl Sentinel {
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_len = file.metadata()?.len() as usize;
        if file_len < capacity {
            file.set_len(capacity as u64)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let (write_pos, next_seq) = Self::scan_entries(&mmap, capacity);

        Ok(Self {
            mmap,
            write_pos,
            next_seq,
            capacity,
            path,
        })
    }

    pub fn open_default<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open(path, DEFAULT_WAL_SIZE)
    }

    /// Append a message. Returns the assigned sequence number.
    pub fn append(&mut self, msg_type: u8, payload: &[u8], timestamp_ns: u64) -> io::Result<u64> {
        let entry_size = JOURNAL_HEADER_SIZE + payload.len();
        if self.write_pos + entry_size > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "WAL capacity exhausted",
            ));
        }

        let seq = self.next_seq;
        let crc = crc32fast::hash(payload);
        let header = JournalHeader {
            sequence_number: seq,
            timestamp_ns,
            msg_type,
            payload_size: payload.len() as u32,
            crc32: crc,
        };

        let header_bytes: &[u8] = unsafe {
            std::slice::from_raw_parts(&header as *const JournalHeader as *const u8, JOURNAL_HEADER_SIZE)
        };
        self.mmap[self.write_pos..self.write_pos + JOURNAL_HEADER_SIZE].copy_from_slice(header_bytes);

        let payload_start = self.write_pos + JOURNAL_HEADER_SIZE;
        self.mmap[payload_start..payload_start + payload.len()].copy_from_slice(payload);

        self.write_pos += entry_size;
        self.next_seq += 1;
        Ok(seq)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    pub fn entry_count(&self) -> u64 {
        self.next_seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reset(&mut self) {
        self.mmap.fill(0);
        self.write_pos = 0;
        self.next_seq = 0;
    }

    pub fn read_all_entries(&self) -> Vec<JournalEntry> {
        let mut entries = Vec::new();
        let mut pos = 0usize;

        while pos + JOURNAL_HEADER_SIZE <= self.write_pos {
            let header: JournalHeader =
                unsafe { std::ptr::read_unaligned(self.mmap[pos..].as_ptr() as *const JournalHeader) };

            if header.sequence_number != entries.len() as u64 {
                break;
            }

            let payload_size = header.payload_size as usize;
            let payload_start = pos + JOURNAL_HEADER_SIZE;
            let payload_end = payload_start + payload_size;
            if payload_end > self.capacity {
                break;
            }

            let payload = &self.mmap[payload_start..payload_end];
            if crc32fast::hash(payload) != header.crc32 {
                break;
            }

            entries.push(JournalEntry {
                header,
                payload: payload.to_vec(),
            });
            pos = payload_end;
        }

        entries
    }

    fn scan_entries(mmap: &MmapMut, capacity: usize) -> (usize, u64) {
        let mut pos = 0usize;
        let mut seq = 0u64;

        while pos + JOURNAL_HEADER_SIZE <= capacity {
            let header: JournalHeader =
                unsafe { std::ptr::read_unaligned(mmap[pos..].as_ptr() as *const JournalHeader) };

            if header.sequence_number != seq {
                break;
            }
            if header.msg_type == 0 && header.payload_size == 0 {
                break;
            }

            let payload_size = header.payload_size as usize;
            let payload_start = pos + JOURNAL_HEADER_SIZE;
            let payload_end = payload_start + payload_size;
            if payload_end > capacity {
                break;
            }

            let payload = &mmap[payload_start..payload_end];
            if crc32fast::hash(payload) != header.crc32 {
                break;
            }

            pos = payload_end;
            seq += 1;
        }

        (pos, seq)
    }
}

// ---------------------------------------------------------------------------
// The PersistenceStore contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub user_id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub symbol: String,
    pub price: Price,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order_id: u64,
    pub user_id: u64,
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    pub quantity: i64,
    pub status: OrderStatus,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub symbol: String,
    pub price: Price,
    pub quantity: i64,
    pub timestamp: u64,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationLogEntry {
    pub check_date: String,
    pub total_trades: u64,
    pub matched_trades: u64,
    pub discrepancies: u64,
    pub accuracy: f64,
    pub timestamp: u64,
}

/// The relational sink the engines write through. Quantity and realized
/// P&L on `upsert_position` are additive deltas; avg_cost is an overwrite.
pub trait PersistenceStore {
    fn bulk_insert_orders(&mut self, rows: &[OrderRow]) -> Result<Vec<u64>, PersistenceError>;
    fn bulk_insert_trades(&mut self, rows: &[TradeRow]) -> Result<Vec<u64>, PersistenceError>;
    fn update_order_status(&mut self, order_id: u64, status: OrderStatus) -> Result<(), PersistenceError>;
    fn upsert_position(
        &mut self,
        user_id: u64,
        symbol: &str,
        quantity_delta: i64,
        avg_cost: Price,
        realized_pnl_delta: Price,
    ) -> Result<(), PersistenceError>;
    fn get_trades_by_date(&self, date: &str) -> Result<Vec<TradeRecord>, PersistenceError>;
    fn get_order(&self, order_id: u64) -> Result<Option<OrderRecord>, PersistenceError>;
    fn insert_reconciliation_log(&mut self, entry: ReconciliationLogEntry) -> Result<(), PersistenceError>;
    fn get_reconciliation_history(&self, limit: usize) -> Result<Vec<ReconciliationLogEntry>, PersistenceError>;
}

#[derive(Debug, Clone, PartialEq)]
struct PositionRow {
    quantity: i64,
    avg_cost: Price,
    realized_pnl: Price,
}

/// In-memory reference implementation, backed by an optional `Sentinel` WAL
/// for the append-only reconciliation audit log.
pub struct InMemoryStore {
    orders: std::collections::HashMap<u64, OrderRecord>,
    trades: Vec<TradeRecord>,
    positions: std::collections::HashMap<(u64, String), PositionRow>,
    reconciliation_log: Vec<ReconciliationLogEntry>,
    audit_wal: Option<Sentinel>,
    next_trade_id: u64,
    /// One monotonic clock shared by orders and trades, so a trade inserted
    /// after the orders it references always gets a later timestamp. Two
    /// independent counters (order_id-derived vs. trade_id-derived) would
    /// let a trade's timestamp fall behind its own orders' and fail the
    /// reconciler's causal-ordering check.
    next_timestamp: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            orders: std::collections::HashMap::new(),
            trades: Vec::new(),
            positions: std::collections::HashMap::new(),
            reconciliation_log: Vec::new(),
            audit_wal: None,
            next_trade_id: 0,
            next_timestamp: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.next_timestamp += 1;
        self.next_timestamp
    }

    /// Back the reconciliation audit log with a real mmap WAL on disk.
    pub fn with_audit_log<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut store = Self::new();
        store.audit_wal = Some(Sentinel::open_default(path)?);
        Ok(store)
    }

    fn encode_log_entry(entry: &ReconciliationLogEntry) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        let date_bytes = entry.check_date.as_bytes();
        buf.extend_from_slice(&(date_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(date_bytes);
        buf.extend_from_slice(&entry.total_trades.to_le_bytes());
        buf.extend_from_slice(&entry.matched_trades.to_le_bytes());
        buf.extend_from_slice(&entry.discrepancies.to_le_bytes());
        buf.extend_from_slice(&entry.accuracy.to_le_bytes());
        buf.extend_from_slice(&entry.timestamp.to_le_bytes());
        buf
    }

    pub fn audit_log_entry_count(&self) -> u64 {
        self.audit_wal.as_ref().map(Sentinel::entry_count).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceStore for InMemoryStore {
    fn bulk_insert_orders(&mut self, rows: &[OrderRow]) -> Result<Vec<u64>, PersistenceError> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id = self.orders.len() as u64 + 1;
            let timestamp = self.tick();
            self.orders.insert(
                order_id,
                OrderRecord {
                    order_id,
                    user_id: row.user_id,
                    symbol: row.symbol.clone(),
                    side: row.side,
                    price: row.price.round_to_cent(),
                    quantity: row.quantity,
                    status: OrderStatus::Pending,
                    timestamp,
                },
            );
            ids.push(order_id);
        }
        Ok(ids)
    }

    fn bulk_insert_trades(&mut self, rows: &[TradeRow]) -> Result<Vec<u64>, PersistenceError> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            self.next_trade_id += 1;
            let trade_id = self.next_trade_id;
            let timestamp = self.tick();
            self.trades.push(TradeRecord {
                trade_id,
                buy_order_id: row.buy_order_id,
                sell_order_id: row.sell_order_id,
                symbol: row.symbol.clone(),
                price: row.price.round_to_cent(),
                quantity: row.quantity,
                timestamp,
                date: "today".to_string(),
            });
            ids.push(trade_id);
        }
        Ok(ids)
    }

    fn update_order_status(&mut self, order_id: u64, status: OrderStatus) -> Result<(), PersistenceError> {
        match self.orders.get_mut(&order_id) {
            Some(order) => {
                order.status = status;
                Ok(())
            }
            None => Err(PersistenceError::NotFound {
                entity: "order",
                id: order_id,
            }),
        }
    }

    fn upsert_position(
        &mut self,
        user_id: u64,
        symbol: &str,
        quantity_delta: i64,
        avg_cost: Price,
        realized_pnl_delta: Price,
    ) -> Result<(), PersistenceError> {
        let key = (user_id, symbol.to_string());
        let row = self.positions.entry(key).or_insert(PositionRow {
            quantity: 0,
            avg_cost: Price::ZERO,
            realized_pnl: Price::ZERO,
        });
        row.quantity += quantity_delta;
        // avg_cost and realized_pnl cross from the engines' full-precision
        // ledger into a DECIMAL(10,2)-shaped row here; round half-to-even to
        // the column's precision rather than storing sub-cent remainders.
        row.avg_cost = avg_cost.round_to_cent();
        row.realized_pnl = (row.realized_pnl + realized_pnl_delta).round_to_cent();
        Ok(())
    }

    fn get_trades_by_date(&self, date: &str) -> Result<Vec<TradeRecord>, PersistenceError> {
        Ok(self.trades.iter().filter(|t| t.date == date).cloned().collect())
    }

    fn get_order(&self, order_id: u64) -> Result<Option<OrderRecord>, PersistenceError> {
        Ok(self.orders.get(&order_id).cloned())
    }

    fn insert_reconciliation_log(&mut self, entry: ReconciliationLogEntry) -> Result<(), PersistenceError> {
        if let Some(wal) = &mut self.audit_wal {
            let payload = Self::encode_log_entry(&entry);
            wal.append(journal_msg_type::RECONCILIATION_LOG, &payload, entry.timestamp)?;
        }
        self.reconciliation_log.push(entry);
        Ok(())
    }

    fn get_reconciliation_history(&self, limit: usize) -> Result<Vec<ReconciliationLogEntry>, PersistenceError> {
        let start = self.reconciliation_log.len().saturating_sub(limit);
        Ok(self.reconciliation_log[start..].to_vec())
    }
}
