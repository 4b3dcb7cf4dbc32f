use std::{
    fmt,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use sea_orm::{ActiveValue::NotSet, EntityTrait, PaginatorTrait, Set};
use tracing::debug;

use crate::{
    db,
    entities::movies,
    error::{AppResult, DataError},
    models::{FIELD_NAMES, MovieRecord},
};

/// Rows per insert statement; sqlite caps the number of bind parameters.
const INSERT_CHUNK: usize = 500;

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Format {
    Csv,
    Json,
    Excel,
    Html,
    Bincode,
    Markdown,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Excel => "xlsx",
            Format::Html => "html",
            Format::Bincode => "bin",
            Format::Markdown => "md",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Excel => "excel",
            Format::Html => "html",
            Format::Bincode => "bincode",
            Format::Markdown => "markdown",
        })
    }
}

/// All `<pattern>.csv` files under `directory`, in filesystem lookup order.
/// Fails when nothing matches, before any output is touched.
pub fn discover_datasets(directory: &Path, pattern: &str) -> AppResult<Vec<PathBuf>> {
    let glob_pattern = directory.join(format!("{pattern}.csv"));
    let mut files = Vec::new();
    for entry in glob::glob(&glob_pattern.to_string_lossy())? {
        files.push(entry?);
    }
    if files.is_empty() {
        return Err(DataError::NoFilesMatched {
            pattern: pattern.to_string(),
            directory: directory.to_path_buf(),
        }
        .into());
    }
    debug!(matched = files.len(), pattern = %pattern, "discovered datasets");
    Ok(files)
}

/// Loads and concatenates datasets, reporting per-file row counts.
pub fn load_records(
    paths: &[PathBuf],
    mut on_file: impl FnMut(&Path, usize),
) -> AppResult<Vec<MovieRecord>> {
    let mut records = Vec::new();
    for path in paths {
        let mut reader = csv::Reader::from_path(path)?;
        let before = records.len();
        for row in reader.deserialize() {
            records.push(row?);
        }
        on_file(path, records.len() - before);
    }
    Ok(records)
}

/// Serializes the combined table to `<output>.<ext>` and returns the path.
pub fn write_format(records: &[MovieRecord], format: Format, output: &str) -> AppResult<PathBuf> {
    let path = PathBuf::from(format!("{output}.{}", format.extension()));
    match format {
        Format::Csv => {
            let mut writer = csv::Writer::from_path(&path)?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        },
        Format::Json => {
            serde_json::to_writer(BufWriter::new(File::create(&path)?), records)?;
        },
        Format::Excel => write_excel(records, &path)?,
        Format::Html => std::fs::write(&path, render_html(records))?,
        Format::Bincode => {
            bincode::serialize_into(BufWriter::new(File::create(&path)?), records)?;
        },
        Format::Markdown => std::fs::write(&path, render_markdown(records))?,
    }
    Ok(path)
}

/// Appends every dataset's rows into the flat `movies` table, creating it on
/// first use, and returns the table's row count afterwards.
pub async fn load_into_table(
    db_path: &Path,
    paths: &[PathBuf],
    mut on_file: impl FnMut(&Path, usize),
) -> AppResult<u64> {
    let db = db::connect(&db::sqlite_url(db_path)).await?;
    db::ensure_movies_table(&db).await?;

    for path in paths {
        let records = load_records(std::slice::from_ref(path), |_, _| {})?;
        for chunk in records.chunks(INSERT_CHUNK) {
            let rows = chunk.iter().map(|r| movies::ActiveModel {
                id: NotSet,
                genre: Set(r.genre.clone()),
                category: Set(r.category.clone()),
                title: Set(r.title.clone()),
                year: Set(r.year),
                distribution: Set(r.distribution.clone()),
                description: Set(r.description.clone()),
                url: Set(r.url.clone()),
                cover_photo: Set(r.cover_photo.clone()),
            });
            movies::Entity::insert_many(rows).exec(&db).await?;
        }
        on_file(path, records.len());
    }

    Ok(movies::Entity::find().count(&db).await?)
}

fn write_excel(records: &[MovieRecord], path: &Path) -> AppResult<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in FIELD_NAMES.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, record.genre.as_str())?;
        sheet.write_string(row, 1, record.category.as_str())?;
        sheet.write_string(row, 2, record.title.as_str())?;
        sheet.write_number(row, 3, record.year as f64)?;
        sheet.write_string(row, 4, record.distribution.as_str())?;
        sheet.write_string(row, 5, record.description.as_str())?;
        sheet.write_string(row, 6, record.url.as_str())?;
        sheet.write_string(row, 7, record.cover_photo.as_str())?;
    }

    workbook.save(path)?;
    Ok(())
}

fn cells(record: &MovieRecord) -> [String; 8] {
    [
        record.genre.clone(),
        record.category.clone(),
        record.title.clone(),
        record.year.to_string(),
        record.distribution.clone(),
        record.description.clone(),
        record.url.clone(),
        record.cover_photo.clone(),
    ]
}

fn render_html(records: &[MovieRecord]) -> String {
    let mut out = String::from("<table>\n  <thead>\n    <tr>");
    for name in FIELD_NAMES {
        out.push_str(&format!("<th>{}</th>", escape_html(name)));
    }
    out.push_str("</tr>\n  </thead>\n  <tbody>\n");
    for record in records {
        out.push_str("    <tr>");
        for cell in cells(record) {
            out.push_str(&format!("<td>{}</td>", escape_html(&cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n");
    out
}

fn render_markdown(records: &[MovieRecord]) -> String {
    let mut out = format!("| {} |\n", FIELD_NAMES.join(" | "));
    out.push_str(&format!("|{}\n", " --- |".repeat(FIELD_NAMES.len())));
    for record in records {
        let row =
            cells(record).iter().map(|c| escape_pipes(c)).collect::<Vec<_>>().join(" | ");
        out.push_str(&format!("| {row} |\n"));
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_pipes(s: &str) -> String {
    s.replace('|', "\\|")
}
