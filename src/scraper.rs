use std::{
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use scraper::{Html, Selector};
use tracing::debug;
use wreq::header::REFERER;

use crate::{
    config::Config,
    error::AppResult,
    models::{Category, Genre},
    source::{PageStream, RecordSource, SourceMovie},
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP-backed record source scraping the fzmovies genre search pages.
pub struct FzSource {
    client: wreq::Client,
    base_url: String,
    delay_ms: u64,
    limiter: Arc<Limiter>,
}

impl FzSource {
    pub fn new(client: wreq::Client, config: &Config) -> Self {
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.source_rps.max(1)).unwrap(),
        )));
        Self {
            client,
            base_url: config.source_base_url.trim_end_matches('/').to_string(),
            delay_ms: config.page_delay_ms,
            limiter,
        }
    }
}

#[async_trait]
impl RecordSource for FzSource {
    async fn search(
        &self,
        genre: Genre,
        category: Category,
        limit: u64,
    ) -> AppResult<Box<dyn PageStream>> {
        debug!(genre = %genre, category = %category, limit = limit, "opening genre search");
        Ok(Box::new(FzPages {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            delay_ms: self.delay_ms,
            limiter: self.limiter.clone(),
            genre,
            category,
            limit,
            page: 1,
            fetched: 0,
            done: false,
        }))
    }
}

struct FzPages {
    client: wreq::Client,
    base_url: String,
    delay_ms: u64,
    limiter: Arc<Limiter>,
    genre: Genre,
    category: Category,
    limit: u64,
    page: u32,
    fetched: u64,
    done: bool,
}

#[async_trait]
impl PageStream for FzPages {
    async fn next_page(&mut self) -> AppResult<Option<Vec<SourceMovie>>> {
        if self.done {
            return Ok(None);
        }

        if self.page > 1 {
            let delay = self.delay_ms + jitter_ms(150);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.limiter.until_ready().await;

        let url = format!("{}/genresearch.php", self.base_url);
        debug!(genre = %self.genre, category = %self.category, page = self.page, "fetching search page");
        let page = self.page.to_string();
        let html = self
            .client
            .get(&url)
            .query(&[
                ("genre", self.genre.as_str()),
                ("category", self.category.as_str()),
                ("pg", page.as_str()),
            ])
            .header(REFERER, self.base_url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let movies = parse_search_page(&html, &self.base_url);
        debug!(page = self.page, movies_found = movies.len(), "parsed search page");

        if movies.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.fetched += movies.len() as u64;
        if self.fetched >= self.limit {
            // Soft ceiling reached: serve this page whole, then stop.
            self.done = true;
        }
        self.page += 1;

        Ok(Some(movies))
    }
}

fn parse_search_page(html: &str, base_url: &str) -> Vec<SourceMovie> {
    let doc = Html::parse_document(html);
    let item_sel = Selector::parse("div.mainbox").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();
    let img_sel = Selector::parse("img[src]").unwrap();
    let name_sel = Selector::parse("span.moviename").unwrap();
    let desc_sel = Selector::parse("span.moviedesc").unwrap();
    let quality_sel = Selector::parse("i.quality").unwrap();

    let mut out = Vec::new();

    for item in doc.select(&item_sel) {
        let Some(href) = item.select(&link_sel).next().and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Some(name) = item.select(&name_sel).next() else { continue };

        let name_text = name.text().collect::<String>();
        let Some((title, year)) = split_trailing_year(&name_text) else { continue };

        let cover_photo = item
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| absolutize(base_url, src))
            .unwrap_or_default();

        let description = item
            .select(&desc_sel)
            .next()
            .map(|d| d.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let distribution = item
            .select(&quality_sel)
            .next()
            .map(|q| q.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        out.push(SourceMovie {
            title: title.to_string(),
            year: year.unwrap_or_default(),
            distribution,
            description,
            url: absolutize(base_url, href),
            cover_photo,
        });
    }

    out
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base_url, href.trim_start_matches('/'))
    }
}

fn jitter_ms(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos =
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos() as u64).unwrap_or(0);
    nanos % (max + 1)
}

fn split_trailing_year(name: &str) -> Option<(&str, Option<i32>)> {
    let s = name.trim();
    if s.is_empty() {
        return None;
    }
    if !s.ends_with(')') {
        return Some((s, None));
    }
    let Some(open) = s.rfind('(') else {
        return Some((s, None));
    };
    let inside = &s[open + 1..s.len() - 1];
    if inside.len() != 4 || !inside.chars().all(|c| c.is_ascii_digit()) {
        return Some((s, None));
    }
    let year = inside.parse().ok();
    Some((s[..open].trim_end(), year))
}
