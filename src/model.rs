//! Slide, transition and manifest data as served from the data root.

use serde::Deserialize;

/// Canvas-space vertex `[x, y]`.
pub type Point = [f32; 2];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Triangle {
    pub coordinates: [Point; 3],
    /// RGB components in 0..=255.
    pub color: [f32; 3],
    #[serde(default)]
    pub opacity: Option<f32>,
}

impl Triangle {
    /// Opacity with the implicit default of fully opaque.
    pub fn opacity(&self) -> f32 {
        self.opacity.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn average_y(&self) -> f32 {
        self.coordinates.iter().map(|p| p[1]).sum::<f32>() / 3.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Slide {
    pub name: String,
    pub triangles: Vec<Triangle>,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl Slide {
    /// Largest vertex y across every triangle, used to normalize stagger delays.
    pub fn max_y(&self) -> f32 {
        self.triangles
            .iter()
            .flat_map(|t| t.coordinates.iter())
            .map(|p| p[1])
            .fold(0.0, f32::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Pairing {
    pub from_index: usize,
    pub to_index: usize,
    /// Centroid distance computed offline; informational only.
    #[serde(default)]
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
    pub pairings: Vec<Pairing>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransitionFile {
    Bare(Vec<Pairing>),
    Wrapped {
        #[serde(default)]
        from: Option<usize>,
        #[serde(default)]
        to: Option<usize>,
        pairings: Vec<Pairing>,
    },
}

impl Transition {
    /// Parses a transition file body.
    ///
    /// Slide indices missing from the body are recovered from the
    /// `transition_<from>_to_<to>` file name.
    pub fn from_json(bytes: &[u8], filename: &str) -> Result<Self, String> {
        let file: TransitionFile = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        let (from, to, pairings) = match file {
            TransitionFile::Bare(pairings) => (None, None, pairings),
            TransitionFile::Wrapped { from, to, pairings } => (from, to, pairings),
        };
        let named = parse_transition_filename(filename);
        let from = from.or(named.map(|(f, _)| f));
        let to = to.or(named.map(|(_, t)| t));
        match (from, to) {
            (Some(from), Some(to)) => Ok(Self { from, to, pairings }),
            _ => Err(format!(
                "transition slide indices missing and file name {filename:?} does not match transition_<from>_to_<to>"
            )),
        }
    }
}

/// Extracts `(from, to)` from a name containing `transition_<from>_to_<to>`.
pub fn parse_transition_filename(filename: &str) -> Option<(usize, usize)> {
    let start = filename.rfind("transition_")? + "transition_".len();
    let rest = &filename[start..];
    let (from, rest) = split_leading_digits(rest)?;
    let rest = rest.strip_prefix("_to_")?;
    let (to, _) = split_leading_digits(rest)?;
    Some((from, to))
}

fn split_leading_digits(s: &str) -> Option<(usize, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransitionRef {
    pub to: usize,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionRef>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ManifestEntry {
    pub fn transition_to(&self, to: usize) -> Option<&TransitionRef> {
        self.transitions.iter().find(|t| t.to == to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub total_slides: usize,
    pub slides: Vec<ManifestEntry>,
}

impl Manifest {
    /// Checks index density and transition targets, then orders entries by index.
    pub fn validated(mut self) -> Result<Self, String> {
        if self.slides.len() != self.total_slides {
            return Err(format!(
                "total_slides is {} but {} slides are listed",
                self.total_slides,
                self.slides.len()
            ));
        }
        self.slides.sort_by_key(|entry| entry.index);
        for (position, entry) in self.slides.iter().enumerate() {
            if entry.index >= self.total_slides {
                return Err(format!(
                    "slide index {} is outside 0..{}",
                    entry.index, self.total_slides
                ));
            }
            if entry.index != position {
                return Err(format!("slide index {} is listed twice", entry.index));
            }
            if let Some(bad) = entry
                .transitions
                .iter()
                .find(|t| t.to >= self.total_slides)
            {
                return Err(format!(
                    "slide {} lists a transition to unknown slide {}",
                    entry.index, bad.to
                ));
            }
        }
        Ok(self)
    }

    pub fn entry(&self, index: usize) -> Option<&ManifestEntry> {
        self.slides.get(index).filter(|entry| entry.index == index)
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}
