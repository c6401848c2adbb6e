//! Store configuration.

use crate::diagnostics::Advisory;
use crate::options::{leading_integer, parse_opts, ModeSpec};
use crate::transaction::NestingPolicy;
use kabinet_engine::{FixedTuning, HashTuning, OpenMode, TreeTuning, TuneOpts};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Key comparison function shared by a configuration and the store it opens.
pub type SharedComparator = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Configuration for opening (or optimizing) a store.
///
/// Every knob is optional; unset knobs leave the engine default in place.
/// Numeric knobs apply to the variants that understand them and are ignored
/// by the others.
#[derive(Clone, Default)]
pub struct Config {
    pub(crate) mode: Option<ModeSpec>,
    pub(crate) mutex: bool,
    pub(crate) bnum: Option<i64>,
    pub(crate) apow: Option<i64>,
    pub(crate) fpow: Option<i64>,
    pub(crate) opts: Option<TuneOpts>,
    pub(crate) rcnum: Option<i64>,
    pub(crate) lcnum: Option<i64>,
    pub(crate) ncnum: Option<i64>,
    pub(crate) xmsiz: Option<i64>,
    pub(crate) dfunit: Option<i64>,
    pub(crate) lmemb: Option<i64>,
    pub(crate) nmemb: Option<i64>,
    pub(crate) width: Option<i64>,
    pub(crate) limsiz: Option<i64>,
    pub(crate) comparator: Option<SharedComparator>,
    pub(crate) nesting: NestingPolicy,
    pub(crate) advisories: Vec<Advisory>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("mutex", &self.mutex)
            .field("bnum", &self.bnum)
            .field("apow", &self.apow)
            .field("fpow", &self.fpow)
            .field("opts", &self.opts)
            .field("rcnum", &self.rcnum)
            .field("lcnum", &self.lcnum)
            .field("ncnum", &self.ncnum)
            .field("xmsiz", &self.xmsiz)
            .field("dfunit", &self.dfunit)
            .field("lmemb", &self.lmemb)
            .field("nmemb", &self.nmemb)
            .field("width", &self.width)
            .field("limsiz", &self.limsiz)
            .field("comparator", &self.comparator.as_ref().map(|_| "custom"))
            .field("nesting", &self.nesting)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a configuration with every knob unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open mode. Defaults to `"wc"` (writer, create).
    #[must_use]
    pub fn mode(mut self, mode: impl Into<ModeSpec>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Enables the engine's internal lock.
    #[must_use]
    pub const fn mutex(mut self, value: bool) -> Self {
        self.mutex = value;
        self
    }

    /// Sets the number of hash buckets.
    #[must_use]
    pub const fn bnum(mut self, value: i64) -> Self {
        self.bnum = Some(value);
        self
    }

    /// Sets the record alignment power.
    #[must_use]
    pub const fn apow(mut self, value: i64) -> Self {
        self.apow = Some(value);
        self
    }

    /// Sets the free block pool power.
    #[must_use]
    pub const fn fpow(mut self, value: i64) -> Self {
        self.fpow = Some(value);
        self
    }

    /// Sets storage options from letters (`l`, `d`, `b`, `t`).
    #[must_use]
    pub fn opts(mut self, letters: &str) -> Self {
        let opts = parse_opts(letters, &mut self.advisories);
        self.opts = Some(opts);
        self
    }

    /// Sets storage options from engine flags.
    #[must_use]
    pub const fn opts_flags(mut self, opts: TuneOpts) -> Self {
        self.opts = Some(opts);
        self
    }

    /// Sets the record cache size.
    #[must_use]
    pub const fn rcnum(mut self, value: i64) -> Self {
        self.rcnum = Some(value);
        self
    }

    /// Sets the leaf node cache size.
    #[must_use]
    pub const fn lcnum(mut self, value: i64) -> Self {
        self.lcnum = Some(value);
        self
    }

    /// Sets the non-leaf node cache size.
    #[must_use]
    pub const fn ncnum(mut self, value: i64) -> Self {
        self.ncnum = Some(value);
        self
    }

    /// Sets the extra mapped memory size.
    #[must_use]
    pub const fn xmsiz(mut self, value: i64) -> Self {
        self.xmsiz = Some(value);
        self
    }

    /// Sets the auto defragmentation unit.
    #[must_use]
    pub const fn dfunit(mut self, value: i64) -> Self {
        self.dfunit = Some(value);
        self
    }

    /// Sets the number of members per leaf page.
    #[must_use]
    pub const fn lmemb(mut self, value: i64) -> Self {
        self.lmemb = Some(value);
        self
    }

    /// Sets the number of members per non-leaf page.
    #[must_use]
    pub const fn nmemb(mut self, value: i64) -> Self {
        self.nmemb = Some(value);
        self
    }

    /// Sets the value width of a fixed-width store.
    #[must_use]
    pub const fn width(mut self, value: i64) -> Self {
        self.width = Some(value);
        self
    }

    /// Sets the file size limit of a fixed-width store.
    #[must_use]
    pub const fn limsiz(mut self, value: i64) -> Self {
        self.limsiz = Some(value);
        self
    }

    /// Installs a key ordering for an ordered store.
    ///
    /// The function must be a total order; it governs the store for as long
    /// as it stays open.
    #[must_use]
    pub fn comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    /// Sets what happens when a transaction is started inside another.
    #[must_use]
    pub const fn nested_transactions(mut self, policy: NestingPolicy) -> Self {
        self.nesting = policy;
        self
    }

    /// Sets an option by name from its text form.
    ///
    /// Numeric options accept any text with a leading integer (`"42.9"` is
    /// 42). Unknown names and unreadable values are skipped with an
    /// advisory.
    #[must_use]
    pub fn set_option(mut self, name: &str, value: &str) -> Self {
        let name = name.trim_start_matches(':').to_ascii_lowercase();
        match name.as_str() {
            "mode" => self.mode = Some(ModeSpec::from(value)),
            "opts" => return self.opts(value),
            "mutex" => self.mutex = is_truthy(value),
            "nested_transactions" => match value.to_ascii_lowercase().as_str() {
                "ignore" => self.nesting = NestingPolicy::Ignore,
                "fail" | "raise" => self.nesting = NestingPolicy::Fail,
                _ => self.unreadable(&name, value),
            },
            "bnum" | "apow" | "fpow" | "rcnum" | "lcnum" | "ncnum" | "xmsiz" | "dfunit"
            | "lmemb" | "nmemb" | "width" | "limsiz" => match leading_integer(value) {
                Some(number) => *self.numeric_slot(&name) = Some(number),
                None => self.unreadable(&name, value),
            },
            _ => self
                .advisories
                .push(Advisory::UnrecognizedSetting(name.clone())),
        }
        self
    }

    fn numeric_slot(&mut self, name: &str) -> &mut Option<i64> {
        match name {
            "bnum" => &mut self.bnum,
            "apow" => &mut self.apow,
            "fpow" => &mut self.fpow,
            "rcnum" => &mut self.rcnum,
            "lcnum" => &mut self.lcnum,
            "ncnum" => &mut self.ncnum,
            "xmsiz" => &mut self.xmsiz,
            "dfunit" => &mut self.dfunit,
            "lmemb" => &mut self.lmemb,
            "nmemb" => &mut self.nmemb,
            "width" => &mut self.width,
            _ => &mut self.limsiz,
        }
    }

    fn unreadable(&mut self, name: &str, value: &str) {
        self.advisories.push(Advisory::UnreadableSetting {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Resolves the open mode from a mode argument and the mode option.
    ///
    /// The option wins when both are given.
    pub(crate) fn open_mode(&mut self, argument: Option<ModeSpec>) -> OpenMode {
        if argument.is_some() && self.mode.is_some() {
            self.advisories.push(Advisory::ModeOptionSupersedesArgument);
        }
        let spec = self.mode.clone().or(argument).unwrap_or_default();
        spec.to_flags(&mut self.advisories)
    }

    pub(crate) fn has_hash_tuning(&self) -> bool {
        self.bnum.is_some() || self.apow.is_some() || self.fpow.is_some() || self.opts.is_some()
    }

    pub(crate) fn has_tree_tuning(&self) -> bool {
        self.has_hash_tuning() || self.lmemb.is_some() || self.nmemb.is_some()
    }

    pub(crate) fn has_fixed_tuning(&self) -> bool {
        self.width.is_some() || self.limsiz.is_some()
    }

    /// Hash parameters; unset options keep what the engine has.
    pub(crate) fn hash_tuning(&self) -> HashTuning {
        HashTuning {
            bnum: self.bnum.unwrap_or(0),
            apow: saturate_i8(self.apow.unwrap_or(-1)),
            fpow: saturate_i8(self.fpow.unwrap_or(-1)),
            opts: self.opts.unwrap_or(TuneOpts::UNCHANGED),
        }
    }

    pub(crate) fn tree_tuning(&self) -> TreeTuning {
        TreeTuning {
            lmemb: saturate_i32(self.lmemb.unwrap_or(0)),
            nmemb: saturate_i32(self.nmemb.unwrap_or(0)),
            hash: self.hash_tuning(),
        }
    }

    pub(crate) fn fixed_tuning(&self) -> FixedTuning {
        FixedTuning {
            width: saturate_i32(self.width.unwrap_or(0)),
            limsiz: self.limsiz.unwrap_or(0),
        }
    }
}

pub(crate) fn cache_size(value: Option<i64>) -> i32 {
    saturate_i32(value.unwrap_or(0))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub(crate) fn saturate_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn saturate_i8(value: i64) -> i8 {
    value.clamp(i64::from(i8::MIN), i64::from(i8::MAX)) as i8
}
