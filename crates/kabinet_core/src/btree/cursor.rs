//! Movable positions over an ordered store.

use crate::error::CoreResult;
use crate::translate::{check, optional};
use kabinet_engine::{CursorId, OrderedEngine};

/// A position in an ordered store's key order.
///
/// A forward cursor starts at the first key, or the first key at or after
/// its start key. A reverse cursor starts at the last key, or the last key
/// at or before its start key. Duplicates are visited one by one.
///
/// The cursor borrows the store mutably and releases its engine cursor
/// when dropped.
pub struct Cursor<'a, E: OrderedEngine> {
    engine: &'a mut E,
    id: CursorId,
    reverse: bool,
}

impl<'a, E: OrderedEngine> Cursor<'a, E> {
    pub(crate) fn open(engine: &'a mut E, start: Option<&[u8]>, reverse: bool) -> CoreResult<Self> {
        let id = check(engine.cursor_new())?;
        let cursor = Self {
            engine,
            id,
            reverse,
        };
        let placed = match (start, reverse) {
            (None, false) => cursor.engine.cursor_first(id),
            (None, true) => cursor.engine.cursor_last(id),
            (Some(key), false) => cursor.engine.cursor_jump(id, key),
            (Some(key), true) => cursor.engine.cursor_jump_back(id, key),
        };
        optional(placed)?;
        Ok(cursor)
    }

    /// Returns true for cursors walking toward smaller keys.
    pub const fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Returns the current key, or `None` past either end.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn key(&self) -> CoreResult<Option<Vec<u8>>> {
        optional(self.engine.cursor_key(self.id))
    }

    /// Returns the current value, or `None` past either end.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn value(&self) -> CoreResult<Option<Vec<u8>>> {
        optional(self.engine.cursor_value(self.id))
    }

    /// Returns the current key and value, or `None` past either end.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn pair(&self) -> CoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        optional(self.engine.cursor_record(self.id))
    }

    /// Steps once in the cursor's direction.
    ///
    /// Returns false when the step left the store.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn next(&mut self) -> CoreResult<bool> {
        self.step(!self.reverse)
    }

    /// Steps once against the cursor's direction.
    ///
    /// # Errors
    ///
    /// Fails on engine errors.
    pub fn prev(&mut self) -> CoreResult<bool> {
        self.step(self.reverse)
    }

    /// Removes the current record and moves to the record that follows it in
    /// the cursor's direction.
    ///
    /// Returns false when the cursor was not on a record.
    ///
    /// # Errors
    ///
    /// Fails on a read-only store.
    pub fn delete(&mut self) -> CoreResult<bool> {
        if optional(self.engine.cursor_out(self.id))?.is_none() {
            return Ok(false);
        }
        if self.reverse {
            // The engine lands on the following key; walk back past it.
            let moved = if self.key()?.is_some() {
                self.engine.cursor_prev(self.id)
            } else {
                self.engine.cursor_last(self.id)
            };
            optional(moved)?;
        }
        Ok(true)
    }

    fn step(&mut self, forward: bool) -> CoreResult<bool> {
        let moved = if forward {
            self.engine.cursor_next(self.id)
        } else {
            self.engine.cursor_prev(self.id)
        };
        Ok(optional(moved)?.is_some())
    }
}

impl<E: OrderedEngine> Drop for Cursor<'_, E> {
    fn drop(&mut self) {
        self.engine.cursor_free(self.id);
    }
}
