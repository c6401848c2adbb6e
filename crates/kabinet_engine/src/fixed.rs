//! Reference fixed-width engine.

use crate::backend::{FixedEngine, ValueResolver};
use crate::counter;
use crate::error::{EngineError, EngineResult};
use crate::file::{delegate_engine, FileShell, Image, HEADER_SIZE};
use crate::flags::{FixedId, FixedTuning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::vec;
use tracing::debug;

/// Value width used when none is configured.
pub const DEFAULT_WIDTH: u32 = 255;

/// File size limit used when none is configured.
pub const DEFAULT_LIMSIZ: u64 = 268_435_456;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FixedImage {
    width: u32,
    limsiz: u64,
    records: BTreeMap<u64, Vec<u8>>,
}

impl Default for FixedImage {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            limsiz: DEFAULT_LIMSIZ,
            records: BTreeMap::new(),
        }
    }
}

impl FixedImage {
    /// Largest id that fits within the size limit.
    fn limit_id(&self) -> u64 {
        let size_header = match self.width {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            _ => 4,
        };
        self.limsiz.saturating_sub(HEADER_SIZE) / u64::from(self.width + size_header)
    }

    fn min(&self) -> Option<u64> {
        self.records.keys().next().copied()
    }

    fn max(&self) -> Option<u64> {
        self.records.keys().next_back().copied()
    }

    /// Resolves an id for a read or write, rejecting ids outside the file.
    fn resolve(&self, id: FixedId) -> EngineResult<u64> {
        let resolved = match id {
            FixedId::Id(id) => id,
            FixedId::Min => self.min().unwrap_or(0),
            FixedId::Max => self.max().unwrap_or(0),
            FixedId::Prev => self.min().unwrap_or(0).saturating_sub(1),
            FixedId::Next => self.max().unwrap_or(0) + 1,
        };
        if resolved < 1 || resolved > self.limit_id() {
            return Err(EngineError::invalid(format!("id {resolved} is out of range")));
        }
        Ok(resolved)
    }

    /// Resolves a range bound, clamping sentinels on an empty file.
    fn bound(&self, id: FixedId) -> u64 {
        match id {
            FixedId::Id(id) => id,
            FixedId::Min => self.min().unwrap_or(1),
            FixedId::Max => self.max().unwrap_or(0),
            FixedId::Prev => self.min().unwrap_or(1).saturating_sub(1),
            FixedId::Next => self.max().unwrap_or(0) + 1,
        }
    }

    fn fit(&self, mut value: Vec<u8>) -> Vec<u8> {
        value.truncate(self.width as usize);
        value
    }
}

impl Image for FixedImage {
    const KIND: u8 = 3;

    fn record_count(&self) -> u64 {
        self.records.len() as u64
    }

    fn payload_size(&self) -> u64 {
        self.records.len() as u64 * u64::from(self.width)
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

/// A fixed-width database file.
///
/// Records are addressed by positive integer ids and every value is
/// truncated to the configured width.
pub struct FixedFile {
    shell: FileShell<FixedImage>,
    iter: Option<vec::IntoIter<u64>>,
}

impl FixedFile {
    /// Creates an engine that is not yet open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: FileShell::new(FixedImage::default()),
            iter: None,
        }
    }

    fn load_hook(&mut self) {
        self.iter = None;
    }

    fn reset_handles(&mut self) {
        self.iter = None;
    }

    fn write_value<T>(
        &mut self,
        id: FixedId,
        update: impl FnOnce(&FixedImage, u64, Option<&Vec<u8>>) -> EngineResult<(T, Vec<u8>)>,
    ) -> EngineResult<(T, u64)> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        let result = image.resolve(id).and_then(|resolved| {
            let (out, value) = update(&*image, resolved, image.records.get(&resolved))?;
            let value = image.fit(value);
            image.records.insert(resolved, value);
            Ok((out, resolved))
        });
        drop(image);
        self.shell.record(result)
    }
}

impl Default for FixedFile {
    fn default() -> Self {
        Self::new()
    }
}

delegate_engine!(FixedFile);

impl FixedEngine for FixedFile {
    fn tune(&mut self, tuning: FixedTuning) -> EngineResult<()> {
        self.shell.ensure_closed()?;
        let mut image = self.shell.write();
        if tuning.width > 0 {
            image.width = tuning.width.unsigned_abs();
        }
        if tuning.limsiz > 0 {
            image.limsiz = tuning.limsiz.unsigned_abs();
        }
        Ok(())
    }

    fn optimize(&mut self, tuning: FixedTuning) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        if tuning.width > 0 {
            let width = tuning.width.unsigned_abs();
            image.width = width;
            for value in image.records.values_mut() {
                value.truncate(width as usize);
            }
        }
        if tuning.limsiz > 0 {
            image.limsiz = tuning.limsiz.unsigned_abs();
        }
        debug!(width = image.width, limsiz = image.limsiz, "optimized fixed-width file");
        Ok(())
    }

    fn width(&self) -> u32 {
        self.shell.read().width
    }

    fn put(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64> {
        self.write_value(id, |_, _, _| Ok(((), value.to_vec())))
            .map(|(_, id)| id)
    }

    fn put_keep(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64> {
        self.write_value(id, |_, _, old| match old {
            Some(_) => Err(EngineError::keep()),
            None => Ok(((), value.to_vec())),
        })
        .map(|(_, id)| id)
    }

    fn put_cat(&mut self, id: FixedId, value: &[u8]) -> EngineResult<u64> {
        self.write_value(id, |_, _, old| {
            let mut joined = old.cloned().unwrap_or_default();
            joined.extend_from_slice(value);
            Ok(((), joined))
        })
        .map(|(_, id)| id)
    }

    fn put_proc(
        &mut self,
        id: FixedId,
        value: &[u8],
        resolver: ValueResolver<'_>,
    ) -> EngineResult<u64> {
        self.write_value(id, |_, _, old| {
            Ok((
                (),
                match old {
                    Some(old) => resolver(old),
                    None => value.to_vec(),
                },
            ))
        })
        .map(|(_, id)| id)
    }

    fn add_int(&mut self, id: FixedId, num: i32) -> EngineResult<i32> {
        self.write_value(id, |image, _, old| {
            if image.width < 4 {
                return Err(EngineError::invalid("width too small for an integer counter"));
            }
            counter::add_int(old.map(Vec::as_slice), num)
        })
        .map(|(total, _)| total)
    }

    fn add_double(&mut self, id: FixedId, num: f64) -> EngineResult<f64> {
        self.write_value(id, |image, _, old| {
            if image.width < 8 {
                return Err(EngineError::invalid("width too small for a float counter"));
            }
            counter::add_double(old.map(Vec::as_slice), num)
        })
        .map(|(total, _)| total)
    }

    fn resolve_id(&self, id: FixedId) -> EngineResult<u64> {
        self.shell.ensure_open()?;
        let result = self.shell.read().resolve(id);
        self.shell.record(result)
    }

    fn get(&self, id: FixedId) -> EngineResult<Vec<u8>> {
        self.shell.ensure_open()?;
        let image = self.shell.read();
        let result = image.resolve(id).and_then(|resolved| {
            image
                .records
                .get(&resolved)
                .cloned()
                .ok_or_else(EngineError::no_record)
        });
        drop(image);
        self.shell.record(result)
    }

    fn out(&mut self, id: FixedId) -> EngineResult<()> {
        self.shell.ensure_writer()?;
        let mut image = self.shell.write();
        let result = image.resolve(id).and_then(|resolved| {
            image
                .records
                .remove(&resolved)
                .map(|_| ())
                .ok_or_else(EngineError::no_record)
        });
        drop(image);
        self.shell.record(result)
    }

    fn iter_init(&mut self) -> EngineResult<()> {
        self.shell.ensure_open()?;
        let ids: Vec<u64> = self.shell.read().records.keys().copied().collect();
        self.iter = Some(ids.into_iter());
        Ok(())
    }

    fn iter_next(&mut self) -> EngineResult<u64> {
        let image = self.shell.read();
        let next = self
            .iter
            .as_mut()
            .and_then(|ids| ids.find(|id| image.records.contains_key(id)));
        drop(image);
        self.shell.record(next.ok_or_else(EngineError::no_record))
    }

    fn range(&self, lower: FixedId, upper: FixedId, limit: Option<usize>) -> Vec<u64> {
        let image = self.shell.read();
        let (lower, upper) = (image.bound(lower).max(1), image.bound(upper));
        if lower > upper {
            return Vec::new();
        }
        image
            .records
            .range(lower..=upper)
            .map(|(id, _)| *id)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}
