use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub price: f64,
    pub rating: u8,
    pub image_url: String,
    pub category_id: i64,
    pub updated_at: String,
}

pub struct Stats {
    pub categories: usize,
    pub books: usize,
    /// Books whose `category_id` matches no category row.
    pub orphan_books: usize,
}

/// The single connection an ingestion run works through. Opened by the
/// caller, handed to the pipeline, closed when the run ends.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS categories (
                id    INTEGER PRIMARY KEY,
                name  TEXT UNIQUE NOT NULL,
                url   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS books (
                id          INTEGER PRIMARY KEY,
                title       TEXT NOT NULL,
                price       REAL NOT NULL CHECK(price >= 0),
                rating      INTEGER NOT NULL CHECK(rating BETWEEN 0 AND 5),
                image_url   TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id),
                updated_at  TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_books_title_category ON books(title, category_id);
            CREATE INDEX IF NOT EXISTS idx_books_category ON books(category_id);
            ",
        )?;
        Ok(())
    }

    /// Start a write batch. Nothing is visible to other connections until
    /// [`Batch::commit`]; dropping the batch rolls it back.
    pub fn batch(&self) -> Result<Batch<'_>> {
        Ok(Batch {
            tx: self.conn.unchecked_transaction()?,
        })
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare("SELECT id, name, url FROM categories ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reverse lookup from a category to its books.
    pub fn books_in_category(&self, category_id: i64) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, price, rating, image_url, category_id, updated_at
             FROM books WHERE category_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([category_id], book_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<Stats> {
        let categories: usize =
            self.conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?;
        let books: usize = self.conn.query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))?;
        let orphan_books: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM books WHERE category_id NOT IN (SELECT id FROM categories)",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            categories,
            books,
            orphan_books,
        })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}

fn book_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        rating: row.get(3)?,
        image_url: row.get(4)?,
        category_id: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Transaction-scoped writes. Lookups run inside the same transaction, so
/// find-before-write holds as long as only one run touches the database.
pub struct Batch<'conn> {
    tx: Transaction<'conn>,
}

impl Batch<'_> {
    /// Existing row for `name`, or a new one pointing at `url`. The flag is
    /// true when the row was created.
    pub fn find_or_create_category(&self, name: &str, url: &str) -> Result<(Category, bool)> {
        let existing = self
            .tx
            .query_row(
                "SELECT id, name, url FROM categories WHERE name = ?1",
                [name],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(category) = existing {
            return Ok((category, false));
        }

        self.tx.execute(
            "INSERT INTO categories (name, url) VALUES (?1, ?2)",
            params![name, url],
        )?;
        Ok((
            Category {
                id: self.tx.last_insert_rowid(),
                name: name.to_string(),
                url: url.to_string(),
            },
            true,
        ))
    }

    /// Insert the book, or overwrite price, rating and image of the row
    /// already stored under `(title, category_id)`.
    pub fn upsert_book(
        &self,
        title: &str,
        price: f64,
        rating: u8,
        image_url: &str,
        category_id: i64,
    ) -> Result<(Book, bool)> {
        let category_exists: bool = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
            [category_id],
            |r| r.get(0),
        )?;
        if !category_exists {
            return Err(StoreError::Integrity {
                title: title.to_string(),
                category_id,
            });
        }

        let updated_at = Utc::now().to_rfc3339();
        let existing: Option<i64> = self
            .tx
            .query_row(
                "SELECT id FROM books WHERE title = ?1 AND category_id = ?2",
                params![title, category_id],
                |r| r.get(0),
            )
            .optional()?;

        let (id, created) = match existing {
            Some(id) => {
                self.tx.execute(
                    "UPDATE books SET price = ?1, rating = ?2, image_url = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![price, rating, image_url, updated_at, id],
                )?;
                (id, false)
            }
            None => {
                self.tx.execute(
                    "INSERT INTO books (title, price, rating, image_url, category_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![title, price, rating, image_url, category_id, updated_at],
                )?;
                (self.tx.last_insert_rowid(), true)
            }
        };

        Ok((
            Book {
                id,
                title: title.to_string(),
                price,
                rating,
                image_url: image_url.to_string(),
                category_id,
                updated_at,
            },
            created,
        ))
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
