/// Number of ROI slots an MCA record provides.
pub const MAX_ROIS: usize = 32;

/// A named channel-index interval within a spectrum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roi {
    pub name: String,
    pub lo: i32,
    pub hi: i32,
}

impl Roi {
    pub fn new(name: &str, lo: i32, hi: i32) -> Self {
        Self {
            name: name.to_string(),
            lo,
            hi,
        }
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.lo, self.hi)
    }
}

/// Ordered name -> (lo, hi) table. Iteration follows insertion order;
/// inserting an existing name replaces its bounds in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoiTable {
    rois: Vec<Roi>,
}

impl RoiTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Insert or replace under the trimmed `name`. A blank name cannot be
    /// stored in a hardware slot and is ignored; returns whether the table
    /// took the entry.
    pub fn insert(&mut self, name: &str, lo: i32, hi: i32) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        match self.rois.iter_mut().find(|r| r.name == name) {
            Some(roi) => {
                roi.lo = lo;
                roi.hi = hi;
            }
            None => self.rois.push(Roi::new(name, lo, hi)),
        }
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<Roi> {
        let name = name.trim();
        let idx = self.rois.iter().position(|r| r.name == name)?;
        Some(self.rois.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<(i32, i32)> {
        let name = name.trim();
        self.rois.iter().find(|r| r.name == name).map(Roi::bounds)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rois.iter().map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Roi> {
        self.rois.iter()
    }

    /// Entries ordered by ascending `lo`; equal `lo` keeps insertion order.
    pub fn sorted(&self) -> Vec<Roi> {
        let mut sorted = self.rois.clone();
        sorted.sort_by_key(|r| r.lo);
        sorted
    }
}

impl<'a> IntoIterator for &'a RoiTable {
    type Item = &'a Roi;
    type IntoIter = std::slice::Iter<'a, Roi>;

    fn into_iter(self) -> Self::IntoIter {
        self.rois.iter()
    }
}

impl<S: AsRef<str>> FromIterator<(S, (i32, i32))> for RoiTable {
    fn from_iter<I: IntoIterator<Item = (S, (i32, i32))>>(iter: I) -> Self {
        let mut table = RoiTable::new();
        for (name, (lo, hi)) in iter {
            table.insert(name.as_ref(), lo, hi);
        }
        table
    }
}

/// Quadratic channel -> energy calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub offset: f64,
    pub slope: f64,
    pub quad: f64,
}

impl Calibration {
    pub fn new(offset: f64, slope: f64, quad: f64) -> Self {
        Self {
            offset,
            slope,
            quad,
        }
    }

    pub fn energy(&self, channel: f64) -> f64 {
        self.offset + channel * (self.slope + channel * self.quad)
    }

    /// Energy axis for `npts` channels.
    pub fn energy_axis(&self, npts: usize) -> Vec<f64> {
        (0..npts).map(|ch| self.energy(ch as f64)).collect()
    }

    /// Transform moving ROI bounds defined under `self` onto `target`.
    ///
    /// Returns `None` when the slope ratio is not finite.
    pub fn rescale_to(&self, target: &Calibration) -> Option<RoiTransform> {
        let scale = target.slope / self.slope;
        let offset = target.offset - self.offset;
        if scale.is_finite() && offset.is_finite() {
            Some(RoiTransform { offset, scale })
        } else {
            None
        }
    }
}

/// Linear map applied to ROI bounds: `round(offset + scale * ch)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiTransform {
    pub offset: f64,
    pub scale: f64,
}

impl RoiTransform {
    pub const IDENTITY: RoiTransform = RoiTransform {
        offset: 0.0,
        scale: 1.0,
    };

    pub fn apply(&self, channel: i32) -> i32 {
        (self.offset + self.scale * channel as f64).round_ties_even() as i32
    }

    pub fn apply_roi(&self, roi: &Roi) -> Roi {
        Roi::new(roi.name.trim(), self.apply(roi.lo), self.apply(roi.hi))
    }
}

impl Default for RoiTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
