//! Browser targets, browserslist style, and the vendor prefixes they need.
//!
//! Queries resolve against a fixed release snapshot, so builds are
//! reproducible: `last 3 versions` always means the same versions for a
//! given cadence release.
//!
//! | Query                       | Meaning                                  |
//! |-----------------------------|------------------------------------------|
//! | `last N versions`           | newest N releases of every browser       |
//! | `last N <browser> versions` | newest N releases of one browser         |
//! | `<browser> > V` / `>= V`    | every release above / from V             |
//! | `<browser> < V` / `<= V`    | everything up to V                       |
//! | `<browser> V`               | exactly V                                |
//! | `defaults`                  | `last 2 versions`                        |

use std::collections::BTreeMap;
use std::fmt;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Browser {
    Chrome,
    Edge,
    Firefox,
    Ie,
    IosSafari,
    Opera,
    Safari,
    Samsung,
}

impl Browser {
    pub const ALL: [Browser; 8] = [
        Browser::Chrome,
        Browser::Edge,
        Browser::Firefox,
        Browser::Ie,
        Browser::IosSafari,
        Browser::Opera,
        Browser::Safari,
        Browser::Samsung,
    ];

    fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "chrome" => Browser::Chrome,
            "edge" => Browser::Edge,
            "firefox" | "ff" => Browser::Firefox,
            "ie" | "explorer" => Browser::Ie,
            "ios" | "ios_saf" | "iossafari" => Browser::IosSafari,
            "opera" => Browser::Opera,
            "safari" => Browser::Safari,
            "samsung" => Browser::Samsung,
            _ => return None,
        })
    }

    /// Release snapshot, oldest first.
    fn releases(self) -> &'static [f32] {
        match self {
            Browser::Chrome => &[125.0, 126.0, 127.0, 128.0, 129.0, 130.0],
            Browser::Edge => &[125.0, 126.0, 127.0, 128.0, 129.0, 130.0],
            Browser::Firefox => &[126.0, 127.0, 128.0, 129.0, 130.0, 131.0],
            Browser::Ie => &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0],
            Browser::IosSafari => &[15.6, 16.6, 17.4, 17.5, 17.6, 18.0],
            Browser::Opera => &[109.0, 110.0, 111.0, 112.0, 113.0, 114.0],
            Browser::Safari => &[15.6, 16.6, 17.4, 17.5, 17.6, 18.0],
            Browser::Samsung => &[21.0, 22.0, 23.0, 24.0, 25.0, 26.0],
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Browser::Chrome => "chrome",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
            Browser::Ie => "ie",
            Browser::IosSafari => "ios_saf",
            Browser::Opera => "opera",
            Browser::Safari => "safari",
            Browser::Samsung => "samsung",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Prefix {
    Webkit,
    Moz,
    Ms,
}

impl Prefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Prefix::Webkit => "-webkit-",
            Prefix::Moz => "-moz-",
            Prefix::Ms => "-ms-",
        }
    }
}

const ALWAYS: f32 = f32::MAX;

/// Browsers at or below `version` need `prefix` for every property listed.
pub(crate) struct Feature {
    pub properties: &'static [&'static str],
    pub needs: &'static [(Browser, Prefix, f32)],
}

use Browser::*;
use Prefix::*;

pub(crate) const FEATURES: &[Feature] = &[
    Feature {
        properties: &[
            "transform",
            "transform-origin",
            "transform-style",
            "perspective",
            "perspective-origin",
            "backface-visibility",
        ],
        needs: &[
            (Chrome, Webkit, 35.0),
            (Safari, Webkit, 8.0),
            (IosSafari, Webkit, 8.4),
            (Opera, Webkit, 22.0),
            (Firefox, Moz, 15.0),
            (Ie, Ms, 9.0),
        ],
    },
    Feature {
        properties: &[
            "transition",
            "transition-property",
            "transition-duration",
            "transition-timing-function",
            "transition-delay",
        ],
        needs: &[
            (Chrome, Webkit, 25.0),
            (Safari, Webkit, 6.0),
            (IosSafari, Webkit, 6.1),
            (Opera, Webkit, 14.0),
            (Firefox, Moz, 15.0),
        ],
    },
    Feature {
        properties: ANIMATION,
        needs: ANIMATION_NEEDS,
    },
    Feature {
        properties: &[
            "flex",
            "flex-direction",
            "flex-wrap",
            "flex-flow",
            "flex-grow",
            "flex-shrink",
            "flex-basis",
            "justify-content",
            "align-items",
            "align-self",
            "align-content",
            "order",
        ],
        needs: &[
            (Chrome, Webkit, 28.0),
            (Safari, Webkit, 8.0),
            (IosSafari, Webkit, 8.4),
            (Opera, Webkit, 16.0),
        ],
    },
    // IE 10 only understands the 2012 syntax for these.
    Feature {
        properties: &["flex", "flex-direction", "flex-wrap", "flex-flow"],
        needs: &[(Ie, Ms, 10.0)],
    },
    Feature {
        properties: &["user-select"],
        needs: &[
            (Chrome, Webkit, 53.0),
            (Safari, Webkit, ALWAYS),
            (IosSafari, Webkit, ALWAYS),
            (Opera, Webkit, 40.0),
            (Firefox, Moz, 68.0),
            (Ie, Ms, 11.0),
            (Edge, Ms, 18.0),
        ],
    },
    Feature {
        properties: &["appearance"],
        needs: &[
            (Chrome, Webkit, 83.0),
            (Edge, Webkit, 83.0),
            (Safari, Webkit, 15.3),
            (IosSafari, Webkit, 15.3),
            (Opera, Webkit, 69.0),
            (Samsung, Webkit, 13.0),
            (Firefox, Moz, 79.0),
        ],
    },
    Feature {
        properties: &["box-sizing"],
        needs: &[(Chrome, Webkit, 9.0), (Safari, Webkit, 5.0), (Firefox, Moz, 28.0)],
    },
    Feature {
        properties: &["backdrop-filter"],
        needs: &[(Safari, Webkit, 17.6), (IosSafari, Webkit, 17.6)],
    },
    Feature {
        properties: &["hyphens"],
        needs: &[
            (Safari, Webkit, ALWAYS),
            (IosSafari, Webkit, ALWAYS),
            (Firefox, Moz, 42.0),
            (Ie, Ms, 11.0),
            (Edge, Ms, 18.0),
        ],
    },
    Feature {
        properties: &["text-size-adjust"],
        needs: &[(IosSafari, Webkit, ALWAYS)],
    },
    Feature {
        properties: &[
            "columns",
            "column-count",
            "column-gap",
            "column-rule",
            "column-width",
            "column-span",
        ],
        needs: &[
            (Chrome, Webkit, 49.0),
            (Safari, Webkit, 8.0),
            (Opera, Webkit, 36.0),
            (Firefox, Moz, 51.0),
        ],
    },
    Feature {
        properties: &["filter"],
        needs: &[
            (Chrome, Webkit, 52.0),
            (Safari, Webkit, 9.0),
            (Opera, Webkit, 39.0),
            (Samsung, Webkit, 5.0),
        ],
    },
    Feature {
        properties: &["clip-path"],
        needs: &[
            (Chrome, Webkit, 54.0),
            (Safari, Webkit, 13.0),
            (IosSafari, Webkit, 13.0),
            (Opera, Webkit, 41.0),
        ],
    },
    Feature {
        properties: &["mask", "mask-image", "mask-size", "mask-position", "mask-repeat"],
        needs: &[
            (Chrome, Webkit, 119.0),
            (Edge, Webkit, 119.0),
            (Safari, Webkit, 15.3),
            (IosSafari, Webkit, 15.3),
            (Opera, Webkit, 105.0),
            (Samsung, Webkit, 25.0),
        ],
    },
];

const ANIMATION: &[&str] = &[
    "animation",
    "animation-name",
    "animation-duration",
    "animation-timing-function",
    "animation-delay",
    "animation-iteration-count",
    "animation-direction",
    "animation-fill-mode",
    "animation-play-state",
];

/// Also governs `@keyframes`.
pub(crate) const ANIMATION_NEEDS: &[(Browser, Prefix, f32)] = &[
    (Chrome, Webkit, 42.0),
    (Safari, Webkit, 8.0),
    (IosSafari, Webkit, 8.4),
    (Opera, Webkit, 29.0),
    (Firefox, Moz, 15.0),
];

/// `display: flex` / `inline-flex`.
pub(crate) const FLEX_DISPLAY_NEEDS: &[(Browser, Prefix, f32)] = &[
    (Chrome, Webkit, 28.0),
    (Safari, Webkit, 8.0),
    (IosSafari, Webkit, 8.4),
    (Opera, Webkit, 16.0),
    (Ie, Ms, 10.0),
];

/// `position: sticky`.
pub(crate) const STICKY_NEEDS: &[(Browser, Prefix, f32)] =
    &[(Safari, Webkit, 12.1), (IosSafari, Webkit, 12.5)];

/// Resolved targets: the oldest version of each browser still supported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Targets {
    oldest: BTreeMap<Browser, f32>,
}

impl Targets {
    /// Union of every query.
    pub fn parse<S: AsRef<str>>(queries: &[S]) -> Result<Self, PipelineError> {
        let mut targets = Targets::default();
        for query in queries {
            targets.add(query.as_ref())?;
        }
        Ok(targets)
    }

    fn include(&mut self, browser: Browser, version: f32) {
        let oldest = self.oldest.entry(browser).or_insert(version);
        if version < *oldest {
            *oldest = version;
        }
    }

    fn add(&mut self, query: &str) -> Result<(), PipelineError> {
        let invalid = || PipelineError::Targets(format!("unsupported browser query '{query}'"));
        let words: Vec<String> = query.split_whitespace().map(str::to_ascii_lowercase).collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["defaults"] => self.add("last 2 versions"),
            ["last", n, "versions" | "version"] => {
                let n = parse_count(n).ok_or_else(invalid)?;
                for browser in Browser::ALL {
                    self.include(browser, last_n(browser, n));
                }
                Ok(())
            }
            ["last", n, browser, "versions" | "version"] => {
                let n = parse_count(n).ok_or_else(invalid)?;
                let browser = Browser::parse(browser).ok_or_else(invalid)?;
                self.include(browser, last_n(browser, n));
                Ok(())
            }
            [browser, op, version] => {
                let browser = Browser::parse(browser).ok_or_else(invalid)?;
                let version: f32 = version.parse().map_err(|_| invalid())?;
                let oldest = match *op {
                    ">" => next_after(version),
                    ">=" => version,
                    "<" | "<=" => 0.0,
                    _ => return Err(invalid()),
                };
                self.include(browser, oldest);
                Ok(())
            }
            [browser, version] => {
                let browser = Browser::parse(browser).ok_or_else(invalid)?;
                let version: f32 = version.parse().map_err(|_| invalid())?;
                self.include(browser, version);
                Ok(())
            }
            _ => Err(invalid()),
        }
    }

    /// Oldest targeted version of `browser`, if it is targeted at all.
    pub fn oldest(&self, browser: Browser) -> Option<f32> {
        self.oldest.get(&browser).copied()
    }

    /// Prefixes required by `needs`, in `-webkit-`, `-moz-`, `-ms-` order.
    pub(crate) fn prefixes(&self, needs: &[(Browser, Prefix, f32)]) -> Vec<Prefix> {
        let mut out: Vec<Prefix> = needs
            .iter()
            .filter(|(browser, _, max)| self.oldest(*browser).is_some_and(|v| v <= *max))
            .map(|(_, prefix, _)| *prefix)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Prefixes needed for `property`.
    pub fn property_prefixes(&self, property: &str) -> Vec<Prefix> {
        let mut out: Vec<Prefix> = FEATURES
            .iter()
            .filter(|f| f.properties.contains(&property))
            .flat_map(|f| self.prefixes(f.needs))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

fn parse_count(n: &str) -> Option<usize> {
    n.parse().ok().filter(|n| *n > 0)
}

fn last_n(browser: Browser, n: usize) -> f32 {
    let releases = browser.releases();
    releases[releases.len().saturating_sub(n)]
}

/// Smallest version strictly newer than `v` at the precision we track.
fn next_after(v: f32) -> f32 {
    v + 0.01
}
