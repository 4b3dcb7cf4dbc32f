use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Column order of every flat dataset, CSV header included.
pub const FIELD_NAMES: [&str; 8] =
    ["genre", "category", "title", "year", "distribution", "description", "url", "cover_photo"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Biography,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    FilmNoir,
    History,
    Horror,
    Music,
    Musical,
    Mystery,
    Romance,
    SciFi,
    Sport,
    Thriller,
    War,
    Western,
}

impl Genre {
    pub const ALL: [Genre; 22] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Biography,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Family,
        Genre::Fantasy,
        Genre::FilmNoir,
        Genre::History,
        Genre::Horror,
        Genre::Music,
        Genre::Musical,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Sport,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Biography => "Biography",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::History => "History",
            Genre::Horror => "Horror",
            Genre::Music => "Music",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Sport => "Sport",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DataError::UnknownGenre(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Category {
    Hollywood,
    Bollywood,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Hollywood, Category::Bollywood];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hollywood => "Hollywood",
            Category::Bollywood => "Bollywood",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DataError::UnknownCategory(s.to_string()))
    }
}

/// One flat dataset row. Field order matches [`FIELD_NAMES`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub genre: String,
    pub category: String,
    pub title: String,
    pub year: i32,
    pub distribution: String,
    pub description: String,
    pub url: String,
    pub cover_photo: String,
}

/// Emitted once per page appended to a dataset file.
#[derive(Clone, Debug)]
pub struct HuntProgress {
    pub category: Category,
    pub genre: Genre,
    /// Cumulative rows written for this genre so far.
    pub genre_total: u64,
    /// Rows added by this page.
    pub page_rows: usize,
    pub saved_to: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct HuntSummary {
    pub total_movies: u64,
    pub genres: Vec<Genre>,
    pub categories: Vec<Category>,
    pub genre_counts: BTreeMap<Genre, u64>,
    pub saved_to: Vec<PathBuf>,
}

impl HuntSummary {
    pub fn absorb(&mut self, progress: &HuntProgress) {
        self.total_movies += progress.page_rows as u64;
        self.genre_counts.insert(progress.genre, progress.genre_total);
        if !self.genres.contains(&progress.genre) {
            self.genres.push(progress.genre);
        }
        if !self.categories.contains(&progress.category) {
            self.categories.push(progress.category);
        }
        if !self.saved_to.contains(&progress.saved_to) {
            self.saved_to.push(progress.saved_to.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_names_round_trip() {
        for genre in Genre::ALL {
            assert_eq!(genre.as_str().parse::<Genre>().unwrap(), genre);
        }
        assert_eq!("sci-fi".parse::<Genre>().unwrap(), Genre::SciFi);
        assert!("Telenovela".parse::<Genre>().is_err());
    }

    #[test]
    fn category_names_round_trip() {
        assert_eq!("Hollywood".parse::<Category>().unwrap(), Category::Hollywood);
        assert_eq!("bollywood".parse::<Category>().unwrap(), Category::Bollywood);
        assert!("Nollywood".parse::<Category>().is_err());
    }

    #[test]
    fn summary_absorbs_page_events() {
        let mut summary = HuntSummary::default();
        let saved_to = PathBuf::from("action.csv");
        summary.absorb(&HuntProgress {
            category: Category::Hollywood,
            genre: Genre::Action,
            genre_total: 20,
            page_rows: 20,
            saved_to: saved_to.clone(),
        });
        summary.absorb(&HuntProgress {
            category: Category::Hollywood,
            genre: Genre::Action,
            genre_total: 35,
            page_rows: 15,
            saved_to: saved_to.clone(),
        });

        assert_eq!(summary.total_movies, 35);
        assert_eq!(summary.genre_counts[&Genre::Action], 35);
        assert_eq!(summary.genres, vec![Genre::Action]);
        assert_eq!(summary.categories, vec![Category::Hollywood]);
        assert_eq!(summary.saved_to, vec![saved_to]);
    }
}
