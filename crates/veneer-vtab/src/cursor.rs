//! Row cursors over adapter output.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::debug;
use veneer_core::coerce::coerce;
use veneer_core::{Bounds, Columns, Result, Row, RowStream, VeneerError};

enum State {
    Open(RowStream),
    Exhausted,
    Closed,
}

/// Single-use, forward-only iteration over one scan's rows.
///
/// Rows are coerced to the declared column types and filtered by the
/// recheck bounds before they are handed out. Errors end the cursor.
pub struct Cursor {
    columns: Arc<Columns>,
    recheck: Bounds,
    state: State,
    emitted: u64,
}

impl Cursor {
    pub fn new(columns: Arc<Columns>, rows: RowStream, recheck: Bounds) -> Self {
        Self {
            columns,
            recheck,
            state: State::Open(rows),
            emitted: 0,
        }
    }

    /// A cursor that yields nothing, for scans that cannot match.
    pub fn empty(columns: Arc<Columns>) -> Self {
        Self {
            columns,
            recheck: Bounds::new(),
            state: State::Exhausted,
            emitted: 0,
        }
    }

    pub fn rows_emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Next coerced row, or `None` once exhausted.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            let rows = match &mut self.state {
                State::Open(rows) => rows,
                State::Exhausted => return Ok(None),
                State::Closed => {
                    return Err(VeneerError::InvalidState("cursor is closed".to_string()))
                }
            };
            let next = rows.next().await;
            let raw = match next {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    self.state = State::Exhausted;
                    return Err(e);
                }
                None => {
                    self.state = State::Exhausted;
                    return Ok(None);
                }
            };
            let row = match self.prepare(raw) {
                Ok(row) => row,
                Err(e) => {
                    self.state = State::Exhausted;
                    return Err(e);
                }
            };
            if let Some(row) = row {
                self.emitted += 1;
                return Ok(Some(row));
            }
        }
    }

    /// Coerce `raw`, returning `None` when the recheck rejects it.
    fn prepare(&self, raw: Row) -> Result<Option<Row>> {
        if raw.len() != self.columns.len() {
            return Err(VeneerError::InvalidState(format!(
                "adapter produced {} values for {} columns",
                raw.len(),
                self.columns.len()
            )));
        }
        let row = raw
            .into_iter()
            .zip(self.columns.iter())
            .map(|(value, column)| coerce(value, column.column_type))
            .collect::<Result<Row>>()?;
        for (name, filter) in &self.recheck {
            let Some(index) = self.columns.position(name) else {
                continue;
            };
            if !filter.matches(&row[index]) {
                return Ok(None);
            }
        }
        Ok(Some(row))
    }

    /// Release the underlying stream. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!("Closing cursor after {} rows", self.emitted);
            self.state = State::Closed;
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Row>> {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next_row().await?.map(|row| (row, cursor)))
        })
        .boxed()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Open(_) => "open",
            State::Exhausted => "exhausted",
            State::Closed => "closed",
        };
        f.debug_struct("Cursor")
            .field("state", &state)
            .field("emitted", &self.emitted)
            .finish()
    }
}
