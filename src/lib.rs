/*!
# Project Dashboard Backend

An HTTP service that keeps the project/designer records of a CSV file in
memory and serves them, together with derived statistics, to the dashboard
frontend.

## Overview

A producer program (typically a script that downloads the latest sheet)
writes the data file. The server parses that file into records, caches them,
and answers dashboard requests from the cache. A user can ask for a refresh,
which runs the producer, waits for the file to settle, and reloads the cache.

## Architecture

### Record Parser
- Reads delimited text with a header row
- Coerces numeric-looking cells to numbers, cell by cell
- Normalizes historical header spellings (`actualHours`, `Actual Hours`,
  `Actual Avaliability Hrs`, ...) to one canonical name

### Cache Store
- Single slot holding the latest snapshot and its load time
- Replaced wholesale on reload; failed reloads leave it untouched

### Refresh Coordinator
- Runs the producer with a timeout, falls back to the existing file when the
  producer fails, waits for the file to settle, then reloads
- Refreshes are serialized

### Query Service
- `GET /` - service metadata
- `GET /health` - file presence, cached record count, last load time
- `GET /api/projects` - all cached records
- `GET /api/summary` - dashboard statistics, optionally filtered
- `GET /api/designers/:name` - per-designer breakdown
- `POST /api/manual-refresh` - run a refresh and report its outcome

## Modules

- **record**: field values, records and canonical field names
- **parser**: CSV to records and back
- **cache**: the in-memory snapshot store
- **producer**: launching the external data producer
- **settle**: waiting for a written file to stop changing
- **refresh**: the refresh state machine
- **aggregate**: efficiency, team ranking and designer statistics
- **config**: environment configuration
- **error**: error types
- **app**: routing and handlers (requires the `web` feature)
*/

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod parser;
pub mod producer;
pub mod record;
pub mod refresh;
pub mod settle;

#[cfg(feature = "web")]
pub mod app;

pub use cache::{CacheSnapshot, CacheStore, LoadOutcome};
pub use config::Config;
pub use error::{ConfigError, ParseError, ProducerError};
pub use record::{FieldValue, Record};
pub use refresh::{ProducerStatus, RefreshCoordinator, RefreshOutcome};
