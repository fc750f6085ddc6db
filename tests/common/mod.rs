//! Shared kennel fixture: a temporary SQLite database with the kennel schema
//! and a small, fixed set of dogs.

#![allow(dead_code)]

use kennel_db::db::Session;
use kennel_db::models::{ConnectionConfig, Statement};
use tempfile::TempDir;

const SCHEMA: &[&str] = &[
    "CREATE TABLE Breeds (
        id_breed INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        characteristic TEXT
    )",
    "CREATE TABLE Dogs (
        id_dog INTEGER PRIMARY KEY,
        id_breed INTEGER NOT NULL REFERENCES Breeds(id_breed),
        owner VARCHAR(100) NOT NULL,
        gender CHAR(1) NOT NULL CHECK (gender IN ('M', 'F')),
        birthday DATE,
        assesment INTEGER NOT NULL,
        psyche_test INTEGER,
        alive BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE Parents (
        id_dog INTEGER NOT NULL REFERENCES Dogs(id_dog),
        id_mother INTEGER REFERENCES Dogs(id_dog),
        id_father INTEGER REFERENCES Dogs(id_dog)
    )",
    "CREATE TABLE Exhibitions (
        id_exhibition INTEGER PRIMARY KEY,
        id_dog INTEGER NOT NULL REFERENCES Dogs(id_dog),
        date_exhibition DATE NOT NULL,
        mark INTEGER NOT NULL CHECK (mark BETWEEN 1 AND 12),
        medal TEXT,
        name TEXT NOT NULL
    )",
    "CREATE TABLE Medicine_book (
        id_illness INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        symptoms TEXT
    )",
    "CREATE TABLE Medicine_history (
        id_dog INTEGER NOT NULL REFERENCES Dogs(id_dog),
        id_illness INTEGER NOT NULL REFERENCES Medicine_book(id_illness),
        date_illness DATE
    )",
];

const DATA: &[&str] = &[
    "INSERT INTO Breeds (id_breed, name, characteristic) VALUES
        (1, 'Collie', 'Herding, gentle'),
        (2, 'Shepherd', 'Guarding, trainable')",
    "INSERT INTO Dogs (id_dog, id_breed, owner, gender, birthday, assesment, psyche_test, alive) VALUES
        (1, 1, 'Ivanov', 'M', '2019-04-01', 5, 5, TRUE),
        (2, 1, 'Petrova', 'F', '2020-01-15', 4, 3, TRUE),
        (3, 1, 'Sidorov', 'F', '2018-06-20', 3, 5, TRUE),
        (4, 2, 'Kuznetsov', 'M', '2017-02-02', 5, 5, FALSE),
        (5, 2, 'Smirnova', 'F', '2021-08-08', 5, 4, TRUE),
        (6, 2, 'Orlov', 'M', '2016-03-03', 4, 5, TRUE)",
    "INSERT INTO Parents (id_dog, id_mother, id_father) VALUES (5, 2, 1)",
    "INSERT INTO Exhibitions (id_dog, date_exhibition, mark, medal, name) VALUES
        (1, '2023-05-01', 11, 'Gold', 'Spring show'),
        (2, '2023-05-01', 7, NULL, 'Spring show'),
        (5, '2023-09-10', 10, 'Silver', 'Autumn cup'),
        (6, '2023-09-10', 9, 'Bronze', 'Autumn cup')",
    "INSERT INTO Medicine_book (id_illness, name, symptoms) VALUES
        (1, 'Distemper', 'Fever, cough'),
        (2, 'Otitis', 'Head shaking')",
    "INSERT INTO Medicine_history (id_dog, id_illness, date_illness) VALUES (3, 2, '2022-11-02')",
];

/// Number of dogs in the fixture.
pub const DOG_COUNT: usize = 6;

/// An open session on a fresh kennel database. The database file lives as
/// long as this value.
pub struct Kennel {
    pub session: Session,
    pub dir: TempDir,
}

pub async fn kennel() -> Kennel {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kennel.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());
    let config = ConnectionConfig::new(url).unwrap();
    let session = Session::connect(&config).await.unwrap();

    for sql in SCHEMA.iter().chain(DATA) {
        session.execute(&Statement::new(*sql)).await.unwrap();
    }
    Kennel { session, dir }
}

/// Single integer from a `SELECT COUNT(*)`-style query.
pub async fn scalar(session: &Session, sql: &str) -> i64 {
    let result = session.fetch(&Statement::new(sql)).await.unwrap();
    result.rows[0][0].as_i64().unwrap()
}

/// Index of the column named `name` in `result`, if present.
pub fn column_index(result: &kennel_db::models::ResultSet, name: &str) -> Option<usize> {
    result.columns.iter().position(|c| c == name)
}
