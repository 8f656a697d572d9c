pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
  id TEXT PRIMARY KEY,
  batch_id TEXT NOT NULL,
  status TEXT NOT NULL,
  started_at TEXT,
  completed_at TEXT,
  total_tests INTEGER NOT NULL DEFAULT 0,
  completed_tests INTEGER NOT NULL DEFAULT 0,
  failed_tests INTEGER NOT NULL DEFAULT 0,
  progress REAL NOT NULL DEFAULT 0,
  current_test_id TEXT,
  current_turn INTEGER,
  error TEXT
);

CREATE TABLE IF NOT EXISTS test_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  job_id TEXT NOT NULL REFERENCES jobs(id),
  test_id TEXT NOT NULL,
  status TEXT NOT NULL,
  started_at TEXT,
  completed_at TEXT,
  error TEXT,
  total_validations INTEGER NOT NULL DEFAULT 0,
  passed_validations INTEGER NOT NULL DEFAULT 0,
  failed_validations INTEGER NOT NULL DEFAULT 0,
  pass_rate REAL NOT NULL DEFAULT 0,
  avg_response_time REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS turn_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  test_result_id INTEGER NOT NULL REFERENCES test_results(id),
  turn_id TEXT NOT NULL,
  turn_order INTEGER NOT NULL,
  user_input TEXT NOT NULL,
  agent_response TEXT NOT NULL,
  scraped_content TEXT,
  response_time_ms INTEGER NOT NULL DEFAULT 0,
  validations_total INTEGER NOT NULL DEFAULT 0,
  validations_passed INTEGER NOT NULL DEFAULT 0,
  validations_failed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS validation_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  turn_result_id INTEGER NOT NULL REFERENCES turn_results(id),
  validation_id TEXT NOT NULL,
  validation_type TEXT NOT NULL,
  is_passed INTEGER NOT NULL,
  score REAL,
  details_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_test_results_job ON test_results(job_id);
CREATE INDEX IF NOT EXISTS idx_turn_results_test ON turn_results(test_result_id);
CREATE INDEX IF NOT EXISTS idx_validation_results_turn ON validation_results(turn_result_id);
"#;
