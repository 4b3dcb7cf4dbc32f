use std::{collections::HashMap, path::Path};

use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, info, warn};

use crate::{
    db,
    entities::{category, genre, movie, movie_genre, movies},
    error::{AppResult, DataError},
    models::{Category, Genre},
};

/// Emitted after each distinct title is handled.
#[derive(Clone, Debug)]
pub struct TitleProgress<'a> {
    pub index: usize,
    pub total: usize,
    pub title: &'a str,
    pub ok: bool,
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
    /// Distinct titles found in the flat table.
    pub titles: usize,
    /// Movie rows created.
    pub created: usize,
    /// (title, reason) for every skipped title.
    pub failures: Vec<(String, String)>,
}

/// Reads the flat `movies` table at `flat_db_path` and builds the relational
/// store at `save_to`: seeded genre/category lookup tables, one movie per
/// distinct title, genre links per distinct flat genre value.
///
/// Per-title resolution failures are recorded and skipped; schema creation or
/// seeding failures abort the run. Movie rows are committed together at the
/// end.
pub async fn relate_tables(
    flat_db_path: &Path,
    save_to: &Path,
    mut on_title: impl FnMut(&TitleProgress),
) -> AppResult<NormalizeReport> {
    if !flat_db_path.exists() {
        return Err(anyhow::anyhow!("flat database '{}' not found", flat_db_path.display()).into());
    }

    let flat = db::connect(&db::sqlite_url(flat_db_path)).await?;
    let rel = db::connect_and_migrate(&db::sqlite_url(save_to)).await?;

    seed_lookup_tables(&rel).await?;
    let genre_ids: HashMap<String, i32> =
        genre::Entity::find().all(&rel).await?.into_iter().map(|m| (m.name, m.id)).collect();
    let category_ids: HashMap<String, i32> =
        category::Entity::find().all(&rel).await?.into_iter().map(|m| (m.name, m.id)).collect();

    let titles: Vec<String> = movies::Entity::find()
        .select_only()
        .column(movies::Column::Title)
        .distinct()
        .order_by_asc(movies::Column::Title)
        .into_tuple()
        .all(&flat)
        .await?;
    debug!(titles = titles.len(), "loaded distinct titles");

    let mut report = NormalizeReport { titles: titles.len(), ..Default::default() };
    let txn = rel.begin().await?;

    for (index, title) in titles.iter().enumerate() {
        let outcome = build_movie(&flat, &txn, &genre_ids, &category_ids, title).await;
        let ok = match outcome {
            Ok(()) => {
                report.created += 1;
                true
            },
            Err(err) => {
                warn!(title = %title, error = %err, "skipping title");
                report.failures.push((title.clone(), err.to_string()));
                false
            },
        };
        on_title(&TitleProgress { index: index + 1, total: titles.len(), title, ok });
    }

    txn.commit().await?;
    info!(created = report.created, skipped = report.failures.len(), "normalization finished");
    Ok(report)
}

/// One-time bulk insert of the closed genre/category name sets, committed
/// before any movie row exists.
async fn seed_lookup_tables(rel: &sea_orm::DatabaseConnection) -> AppResult<()> {
    let txn = rel.begin().await?;

    genre::Entity::insert_many(
        Genre::ALL
            .iter()
            .map(|g| genre::ActiveModel { id: NotSet, name: Set(g.as_str().to_string()) }),
    )
    .exec(&txn)
    .await?;

    category::Entity::insert_many(
        Category::ALL
            .iter()
            .map(|c| category::ActiveModel { id: NotSet, name: Set(c.as_str().to_string()) }),
    )
    .exec(&txn)
    .await?;

    txn.commit().await?;
    Ok(())
}

async fn build_movie(
    flat: &sea_orm::DatabaseConnection,
    txn: &DatabaseTransaction,
    genre_ids: &HashMap<String, i32>,
    category_ids: &HashMap<String, i32>,
    title: &str,
) -> AppResult<()> {
    let rows =
        movies::Entity::find().filter(movies::Column::Title.eq(title)).all(flat).await?;
    let first = rows
        .first()
        .ok_or_else(|| anyhow::anyhow!("no flat rows for title '{title}'"))?;

    // All rows for a title must agree on the category.
    let mut categories: Vec<String> = rows.iter().map(|r| r.category.clone()).collect();
    categories.sort();
    categories.dedup();
    if categories.len() > 1 {
        return Err(DataError::InconsistentCategory {
            title: title.to_string(),
            found: categories,
        }
        .into());
    }

    let category_id = *category_ids
        .get(&first.category)
        .ok_or_else(|| DataError::UnknownCategory(first.category.clone()))?;

    // Distinct genre values, flat-table order preserved.
    let mut genre_names: Vec<&str> = Vec::new();
    for row in &rows {
        if !genre_names.contains(&row.genre.as_str()) {
            genre_names.push(&row.genre);
        }
    }
    let mut link_ids = Vec::with_capacity(genre_names.len());
    for name in genre_names {
        link_ids.push(
            *genre_ids.get(name).ok_or_else(|| DataError::UnknownGenre(name.to_string()))?,
        );
    }

    let inserted = movie::Entity::insert(movie::ActiveModel {
        id: NotSet,
        title: Set(first.title.clone()),
        year: Set(first.year),
        distribution: Set(first.distribution.clone()),
        description: Set(first.description.clone()),
        url: Set(first.url.clone()),
        cover_photo: Set(first.cover_photo.clone()),
        category_id: Set(category_id),
    })
    .exec(txn)
    .await?;
    let movie_id = inserted.last_insert_id;

    movie_genre::Entity::insert_many(link_ids.into_iter().map(|genre_id| {
        movie_genre::ActiveModel { id: NotSet, movie_id: Set(movie_id), genre_id: Set(genre_id) }
    }))
    .exec(txn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseConnection, PaginatorTrait};
    use tempfile::TempDir;

    use super::*;
    use crate::models::MovieRecord;

    fn flat_row(genre: &str, category: &str, title: &str, url: &str) -> MovieRecord {
        MovieRecord {
            genre: genre.to_string(),
            category: category.to_string(),
            title: title.to_string(),
            year: 2020,
            distribution: "Studio1".to_string(),
            description: "desc".to_string(),
            url: url.to_string(),
            cover_photo: "cov1".to_string(),
        }
    }

    async fn seed_flat(path: &Path, rows: &[MovieRecord]) {
        let db = db::connect(&db::sqlite_url(path)).await.unwrap();
        db::ensure_movies_table(&db).await.unwrap();
        movies::Entity::insert_many(rows.iter().map(|r| movies::ActiveModel {
            id: NotSet,
            genre: Set(r.genre.clone()),
            category: Set(r.category.clone()),
            title: Set(r.title.clone()),
            year: Set(r.year),
            distribution: Set(r.distribution.clone()),
            description: Set(r.description.clone()),
            url: Set(r.url.clone()),
            cover_photo: Set(r.cover_photo.clone()),
        }))
        .exec(&db)
        .await
        .unwrap();
    }

    async fn open_relational(path: &Path) -> DatabaseConnection {
        db::connect(&db::sqlite_url(path)).await.unwrap()
    }

    #[tokio::test]
    async fn lookup_tables_are_seeded_once() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(&flat, &[flat_row("Action", "Hollywood", "X", "url1")]).await;

        relate_tables(&flat, &rel, |_| {}).await.unwrap();

        let db = open_relational(&rel).await;
        assert_eq!(genre::Entity::find().count(&db).await.unwrap(), Genre::ALL.len() as u64);
        assert_eq!(
            category::Entity::find().count(&db).await.unwrap(),
            Category::ALL.len() as u64
        );
    }

    #[tokio::test]
    async fn titles_collapse_into_one_movie_with_genre_links() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(
            &flat,
            &[
                flat_row("Action", "Hollywood", "X", "url1"),
                flat_row("Comedy", "Hollywood", "X", "url1"),
                flat_row("Action", "Hollywood", "X", "url1"),
            ],
        )
        .await;

        let report = relate_tables(&flat, &rel, |_| {}).await.unwrap();
        assert_eq!(report.titles, 1);
        assert_eq!(report.created, 1);
        assert!(report.failures.is_empty());

        let db = open_relational(&rel).await;
        let movies_rows = movie::Entity::find().all(&db).await.unwrap();
        assert_eq!(movies_rows.len(), 1);
        let x = &movies_rows[0];
        assert_eq!(x.title, "X");

        let linked_category =
            category::Entity::find_by_id(x.category_id).one(&db).await.unwrap().unwrap();
        assert_eq!(linked_category.name, "Hollywood");

        // Duplicate Action row collapses: exactly one link per distinct genre.
        let links = movie_genre::Entity::find()
            .filter(movie_genre::Column::MovieId.eq(x.id))
            .all(&db)
            .await
            .unwrap();
        let mut names = Vec::new();
        for link in &links {
            let g = genre::Entity::find_by_id(link.genre_id).one(&db).await.unwrap().unwrap();
            names.push(g.name);
        }
        names.sort();
        assert_eq!(names, vec!["Action", "Comedy"]);
    }

    #[tokio::test]
    async fn clean_flat_table_yields_one_movie_per_distinct_title() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(
            &flat,
            &[
                flat_row("Action", "Hollywood", "A", "url-a"),
                flat_row("Drama", "Bollywood", "B", "url-b"),
                flat_row("Horror", "Hollywood", "C", "url-c"),
            ],
        )
        .await;

        let mut seen = Vec::new();
        let report = relate_tables(&flat, &rel, |p| seen.push((p.index, p.total, p.ok))).await.unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(seen, vec![(1, 3, true), (2, 3, true), (3, 3, true)]);

        let db = open_relational(&rel).await;
        assert_eq!(movie::Entity::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn conflicting_categories_skip_the_title_and_record_it() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(
            &flat,
            &[
                flat_row("Action", "Hollywood", "Torn", "url-t"),
                flat_row("Drama", "Bollywood", "Torn", "url-t"),
                flat_row("Action", "Hollywood", "Fine", "url-f"),
            ],
        )
        .await;

        let report = relate_tables(&flat, &rel, |_| {}).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "Torn");
        assert!(report.failures[0].1.contains("conflicting categories"));

        let db = open_relational(&rel).await;
        let titles: Vec<String> = movie::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Fine"]);
    }

    #[tokio::test]
    async fn unknown_lookup_names_skip_the_title() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(
            &flat,
            &[
                flat_row("Telenovela", "Hollywood", "Odd", "url-o"),
                flat_row("Action", "Nollywood", "Stray", "url-s"),
            ],
        )
        .await;

        let report = relate_tables(&flat, &rel, |_| {}).await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.failures.len(), 2);

        let db = open_relational(&rel).await;
        assert_eq!(movie::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_url_across_titles_skips_the_later_title() {
        let dir = TempDir::new().unwrap();
        let flat = dir.path().join("flat.db");
        let rel = dir.path().join("rel.db");
        seed_flat(
            &flat,
            &[
                flat_row("Action", "Hollywood", "First", "url-dup"),
                flat_row("Drama", "Hollywood", "Second", "url-dup"),
            ],
        )
        .await;

        let report = relate_tables(&flat, &rel, |_| {}).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "Second");
    }
}
