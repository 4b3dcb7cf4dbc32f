use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use futures::{Stream, StreamExt, stream};
use tracing::debug;

use crate::{
    error::AppResult,
    models::{Category, FIELD_NAMES, Genre, HuntProgress, HuntSummary, MovieRecord},
    source::{PageStream, RecordSource},
};

#[derive(Clone, Debug)]
pub struct HuntOptions {
    /// Parent directory for the per-genre dataset files.
    pub dir: PathBuf,
    /// Dataset filename prefix.
    pub prefix: String,
    /// Soft ceiling on rows per (category, genre) search; pages are never
    /// split, so the final count may overshoot.
    pub limit: u64,
}

impl Default for HuntOptions {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), prefix: String::new(), limit: 1_000_000 }
    }
}

/// Drives a [`RecordSource`] across the cross-product of the selected
/// categories and genres, appending every page to `<prefix><genre>.csv`.
pub struct Hunter {
    genres: Vec<Genre>,
    categories: Vec<Category>,
}

impl Hunter {
    /// Empty selections mean "all".
    pub fn new(genres: Vec<Genre>, categories: Vec<Category>) -> Self {
        let genres = if genres.is_empty() { Genre::ALL.to_vec() } else { genres };
        let categories = if categories.is_empty() { Category::ALL.to_vec() } else { categories };
        Self { genres, categories }
    }

    /// Lazy mode: one [`HuntProgress`] per appended page, nothing buffered
    /// beyond the page being written. The stream is finite and ends after the
    /// first error.
    pub fn hunt_stream<'a, S>(
        &'a self,
        source: &'a S,
        opts: &'a HuntOptions,
    ) -> impl Stream<Item = AppResult<HuntProgress>> + 'a
    where
        S: RecordSource + ?Sized,
    {
        let mut pending = VecDeque::new();
        for category in &self.categories {
            for genre in &self.genres {
                pending.push_back((*category, *genre));
            }
        }

        let state = HuntState { source, opts, pending, current: None, failed: false };
        stream::unfold(state, |mut state| async move {
            match step(&mut state).await {
                Ok(Some(progress)) => Some((Ok(progress), state)),
                Ok(None) => None,
                Err(err) => {
                    state.failed = true;
                    Some((Err(err), state))
                },
            }
        })
    }

    /// Eager mode: drains the stream into a summary, invoking `on_page` as
    /// each page lands.
    pub async fn hunt<S>(
        &self,
        source: &S,
        opts: &HuntOptions,
        mut on_page: impl FnMut(&HuntProgress),
    ) -> AppResult<HuntSummary>
    where
        S: RecordSource + ?Sized,
    {
        let mut summary = HuntSummary::default();
        let mut events = std::pin::pin!(self.hunt_stream(source, opts));
        while let Some(event) = events.next().await {
            let progress = event?;
            summary.absorb(&progress);
            on_page(&progress);
        }
        Ok(summary)
    }
}

struct HuntState<'a, S: ?Sized> {
    source: &'a S,
    opts: &'a HuntOptions,
    pending: VecDeque<(Category, Genre)>,
    current: Option<PairRun>,
    failed: bool,
}

struct PairRun {
    category: Category,
    genre: Genre,
    pages: Box<dyn PageStream>,
    writer: csv::Writer<File>,
    saved_to: PathBuf,
    count: u64,
}

async fn step<S>(state: &mut HuntState<'_, S>) -> AppResult<Option<HuntProgress>>
where
    S: RecordSource + ?Sized,
{
    if state.failed {
        return Ok(None);
    }

    loop {
        match &mut state.current {
            None => {
                let Some((category, genre)) = state.pending.pop_front() else {
                    return Ok(None);
                };
                debug!(category = %category, genre = %genre, "starting pair");
                let pages = state.source.search(genre, category, state.opts.limit).await?;
                let (writer, saved_to) =
                    open_dataset(&state.opts.dir, &state.opts.prefix, genre)?;
                state.current =
                    Some(PairRun { category, genre, pages, writer, saved_to, count: 0 });
            },
            Some(run) => match run.pages.next_page().await? {
                Some(movies) if !movies.is_empty() => {
                    for movie in &movies {
                        run.writer.serialize(MovieRecord {
                            genre: run.genre.to_string(),
                            category: run.category.to_string(),
                            title: movie.title.clone(),
                            year: movie.year,
                            distribution: movie.distribution.clone(),
                            description: movie.description.clone(),
                            url: movie.url.clone(),
                            cover_photo: movie.cover_photo.clone(),
                        })?;
                    }
                    run.writer.flush()?;

                    run.count += movies.len() as u64;
                    let progress = HuntProgress {
                        category: run.category,
                        genre: run.genre,
                        genre_total: run.count,
                        page_rows: movies.len(),
                        saved_to: run.saved_to.clone(),
                    };
                    if run.count >= state.opts.limit {
                        // Ceiling crossed: no further pages for this pair.
                        state.current = None;
                    }
                    return Ok(Some(progress));
                },
                // An empty page counts as exhaustion.
                Some(_) | None => {
                    debug!(category = %run.category, genre = %run.genre, total = run.count, "pair exhausted");
                    state.current = None;
                },
            },
        }
    }
}

fn open_dataset(dir: &Path, prefix: &str, genre: Genre) -> AppResult<(csv::Writer<File>, PathBuf)> {
    let path = dir.join(format!("{}{}.csv", prefix, genre.as_str().to_lowercase()));
    let fresh = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if fresh {
        writer.write_record(FIELD_NAMES)?;
    }
    Ok((writer, path))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::source::SourceMovie;

    fn movie(title: &str) -> SourceMovie {
        SourceMovie {
            title: title.to_string(),
            year: 2020,
            distribution: "WEBRip".to_string(),
            description: "about".to_string(),
            url: format!("https://example.com/{title}"),
            cover_photo: format!("https://example.com/{title}.jpg"),
        }
    }

    fn page(prefix: &str, rows: usize) -> Vec<SourceMovie> {
        (0..rows).map(|i| movie(&format!("{prefix}-{i}"))).collect()
    }

    /// Replays the same scripted pages for every (genre, category) pair and
    /// counts page requests.
    struct FakeSource {
        pages: Vec<Vec<SourceMovie>>,
        requests: Arc<AtomicUsize>,
        fail_on_page: Option<usize>,
    }

    impl FakeSource {
        fn new(pages: Vec<Vec<SourceMovie>>) -> Self {
            Self { pages, requests: Arc::new(AtomicUsize::new(0)), fail_on_page: None }
        }
    }

    #[async_trait]
    impl RecordSource for FakeSource {
        async fn search(
            &self,
            _genre: Genre,
            _category: Category,
            _limit: u64,
        ) -> AppResult<Box<dyn PageStream>> {
            Ok(Box::new(FakePages {
                pages: self.pages.clone().into(),
                requests: self.requests.clone(),
                fail_on_page: self.fail_on_page,
                served: 0,
            }))
        }
    }

    struct FakePages {
        pages: VecDeque<Vec<SourceMovie>>,
        requests: Arc<AtomicUsize>,
        fail_on_page: Option<usize>,
        served: usize,
    }

    #[async_trait]
    impl PageStream for FakePages {
        async fn next_page(&mut self) -> AppResult<Option<Vec<SourceMovie>>> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.served += 1;
            if self.fail_on_page == Some(self.served) {
                return Err(anyhow::anyhow!("provider unavailable").into());
            }
            Ok(self.pages.pop_front())
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn limit_is_a_soft_ceiling_and_stops_paging() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::new(vec![page("a", 15), page("b", 10), page("c", 99)]);
        let requests = source.requests.clone();
        let hunter = Hunter::new(vec![Genre::Action], vec![Category::Bollywood]);
        let opts =
            HuntOptions { dir: dir.path().to_path_buf(), prefix: String::new(), limit: 20 };

        let summary = hunter.hunt(&source, &opts, |_| {}).await.unwrap();

        assert_eq!(summary.total_movies, 25);
        assert!(summary.genre_counts[&Genre::Action] >= 20);
        // Two pages pulled, the third never requested.
        assert_eq!(requests.load(Ordering::SeqCst), 2);

        let lines = read_lines(&dir.path().join("action.csv"));
        assert_eq!(lines[0], FIELD_NAMES.join(","));
        assert_eq!(lines.len(), 1 + 25);
    }

    #[tokio::test]
    async fn rerun_appends_rows_without_second_header() {
        let dir = TempDir::new().unwrap();
        let hunter = Hunter::new(vec![Genre::Drama], vec![Category::Hollywood]);
        let opts = HuntOptions { dir: dir.path().to_path_buf(), ..Default::default() };

        for _ in 0..2 {
            let source = FakeSource::new(vec![page("x", 3)]);
            hunter.hunt(&source, &opts, |_| {}).await.unwrap();
        }

        let lines = read_lines(&dir.path().join("drama.csv"));
        let headers = lines.iter().filter(|l| *l == &FIELD_NAMES.join(",")).count();
        assert_eq!(headers, 1);
        assert_eq!(lines.len(), 1 + 6);
    }

    #[tokio::test]
    async fn cross_product_writes_one_file_per_genre() {
        let dir = TempDir::new().unwrap();
        let hunter = Hunter::new(vec![Genre::Action, Genre::SciFi], Category::ALL.to_vec());
        let opts = HuntOptions { dir: dir.path().to_path_buf(), ..Default::default() };

        let source = FakeSource::new(vec![page("p", 4)]);
        let mut events = 0;
        let summary = hunter.hunt(&source, &opts, |_| events += 1).await.unwrap();

        // One page per (category, genre) pair.
        assert_eq!(events, 4);
        assert_eq!(summary.total_movies, 16);
        assert_eq!(summary.genres, vec![Genre::Action, Genre::SciFi]);
        assert_eq!(summary.categories, Category::ALL.to_vec());
        assert_eq!(summary.saved_to.len(), 2);

        // Row count per genre file equals the per-page counts summed across
        // both categories.
        for name in ["action.csv", "sci-fi.csv"] {
            let lines = read_lines(&dir.path().join(name));
            assert_eq!(lines.len(), 1 + 8, "{name}");
        }
    }

    #[tokio::test]
    async fn stream_yields_one_event_per_page() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource::new(vec![page("a", 2), page("b", 5)]);
        let hunter = Hunter::new(vec![Genre::Horror], vec![Category::Hollywood]);
        let opts = HuntOptions { dir: dir.path().to_path_buf(), ..Default::default() };

        let events: Vec<_> = hunter.hunt_stream(&source, &opts).collect().await;
        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();

        assert_eq!(events.len(), 2);
        assert_eq!((events[0].page_rows, events[0].genre_total), (2, 2));
        assert_eq!((events[1].page_rows, events[1].genre_total), (5, 7));
        assert!(events.iter().all(|e| e.genre == Genre::Horror));
    }

    #[tokio::test]
    async fn source_failure_propagates_and_ends_the_stream() {
        let dir = TempDir::new().unwrap();
        let mut source = FakeSource::new(vec![page("a", 2), page("b", 2)]);
        source.fail_on_page = Some(2);
        let hunter = Hunter::new(vec![Genre::War], vec![Category::Hollywood]);
        let opts = HuntOptions { dir: dir.path().to_path_buf(), ..Default::default() };

        let events: Vec<_> = hunter.hunt_stream(&source, &opts).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());

        let err = hunter.hunt(&source, &opts, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("provider unavailable"));
    }
}
