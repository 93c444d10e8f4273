//! Integration tests for plugcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Isolated config, cache and plugin directories for one test
    struct Sandbox {
        temp: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let sandbox = Self { temp };
            std::fs::create_dir_all(sandbox.plugins_dir()).unwrap();
            let config = format!(
                "[lock]\ntimeout_ms = 300\npoll_interval_ms = 20\n\n[plugins]\ndirs = [{:?}]\n",
                sandbox.plugins_dir().display().to_string()
            );
            std::fs::write(sandbox.config_path(), config).unwrap();
            sandbox
        }

        fn config_path(&self) -> PathBuf {
            self.temp.path().join("config.toml")
        }

        fn cache_dir(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn plugins_dir(&self) -> PathBuf {
            self.temp.path().join("plugins")
        }

        fn lock_path(&self, suffix: &str) -> PathBuf {
            self.cache_dir().join(format!("update.lock{}", suffix))
        }

        fn install(&self, dir: &str, manifest: &str) -> PathBuf {
            let path = self.plugins_dir().join(dir);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("plugin.json"), manifest).unwrap();
            path
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("plugcache");
            cmd.env("PLUGCACHE_CONFIG", self.config_path())
                .env("PLUGCACHE_CACHE_DIR", self.cache_dir())
                .env("XDG_DATA_HOME", self.temp.path().join("data"))
                .env_remove("PLUGCACHE_CLEAR_CACHE");
            cmd
        }

        fn cache_json(&self) -> serde_json::Value {
            let content = std::fs::read_to_string(self.cache_dir().join("plugins.json")).unwrap();
            serde_json::from_str(&content).unwrap()
        }
    }

    const DB_PLUGIN: &str = r#"{
        "name": "db",
        "version": "1.2.0",
        "topics": [{"topic": "db", "description": "Database tools"}],
        "commands": [
            {"topic": "db", "command": "pull", "aliases": ["pull"], "description": "Pull the schema"},
            {"topic": "db", "command": "push", "hidden": true}
        ]
    }"#;

    fn assert_no_registration(sandbox: &Sandbox) {
        assert!(!sandbox.lock_path(".readers").exists());
        assert!(!sandbox.lock_path(".writer").exists());
        assert!(!sandbox.lock_path(".readers.lock").exists());
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("plugcache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("plugin metadata cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("plugcache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("plugcache"));
    }

    #[test]
    fn commands_lists_builtin_and_user_plugins() {
        let sandbox = Sandbox::new();
        sandbox.install("db", DB_PLUGIN);

        sandbox
            .cmd()
            .args(["commands", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache:clear"))
            .stdout(predicate::str::contains("db:pull"))
            .stdout(predicate::str::contains("db:push").not());

        sandbox
            .cmd()
            .args(["commands", "--all", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("db:push"));

        assert_no_registration(&sandbox);
    }

    #[test]
    fn first_run_writes_cache() {
        let sandbox = Sandbox::new();
        let plugin = sandbox.install("db", DB_PLUGIN);

        sandbox.cmd().arg("commands").assert().success();

        let cache = sandbox.cache_json();
        assert_eq!(cache["version"], env!("CARGO_PKG_VERSION"));
        assert!(cache["node_version"].is_string());
        let key = plugin.display().to_string();
        assert_eq!(cache["plugins"][key.as_str()]["name"], "db");
        assert_eq!(cache["plugins"]["builtin"]["name"], "builtin");
    }

    #[test]
    fn broken_plugin_does_not_break_listing() {
        let sandbox = Sandbox::new();
        sandbox.install("db", DB_PLUGIN);
        let broken = sandbox.install("broken", r#"{"name": "broken"}"#);

        sandbox
            .cmd()
            .args(["commands", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("db:pull"));

        let cache = sandbox.cache_json();
        let key = broken.display().to_string();
        assert_eq!(cache["plugins"][key.as_str()]["version"], "");
    }

    #[test]
    fn which_resolves_aliases() {
        let sandbox = Sandbox::new();
        sandbox.install("db", DB_PLUGIN);

        sandbox
            .cmd()
            .args(["which", "pull"])
            .assert()
            .success()
            .stdout(predicate::str::contains("db:pull"))
            .stdout(predicate::str::contains("db"))
            .stdout(predicate::str::contains("1.2.0"));
    }

    #[test]
    fn which_unknown_command_fails_with_hint() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["which", "nope:nothing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Command not found: nope:nothing"))
            .stderr(predicate::str::contains("Hint:"));

        assert_no_registration(&sandbox);
    }

    #[test]
    fn topics_describe_one_topic() {
        let sandbox = Sandbox::new();
        sandbox.install("db", DB_PLUGIN);

        sandbox
            .cmd()
            .args(["topics", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("db"))
            .stdout(predicate::str::contains("cache"));

        sandbox
            .cmd()
            .args(["topics", "db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Database tools"))
            .stdout(predicate::str::contains("db:pull"));
    }

    #[test]
    fn unknown_topic_points_at_topics() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["topics", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Topic not found: nope"))
            .stderr(predicate::str::contains("Run: plugcache topics"));

        assert_no_registration(&sandbox);
    }

    #[test]
    fn cache_path_points_into_cache_dir() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("plugins.json"));
    }

    #[test]
    fn cache_clear_empties_plugins() {
        let sandbox = Sandbox::new();
        let plugin = sandbox.install("db", DB_PLUGIN);
        sandbox.cmd().arg("commands").assert().success();

        sandbox
            .cmd()
            .args(["cache", "clear"])
            .arg(&plugin)
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 plugin(s)"));
        let cache = sandbox.cache_json();
        assert!(cache["plugins"].get(plugin.display().to_string()).is_none());
        assert!(cache["plugins"].get("builtin").is_some());

        sandbox
            .cmd()
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared"));
        let cache = sandbox.cache_json();
        assert_eq!(cache["plugins"], serde_json::json!({}));
        assert!(cache["node_version"].is_string());
    }

    #[test]
    fn cache_show_prints_json() {
        let sandbox = Sandbox::new();
        sandbox.cmd().arg("commands").assert().success();

        sandbox
            .cmd()
            .args(["cache", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"node_version\""));
    }

    fn plant_stale_entries(sandbox: &Sandbox) {
        std::fs::create_dir_all(sandbox.lock_path(".writer")).unwrap();
        std::fs::write(sandbox.lock_path(".writer").join("pid"), "999999998").unwrap();
        std::fs::write(sandbox.lock_path(".readers"), "999999999\n").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn locks_reports_and_clears_stale_entries() {
        let sandbox = Sandbox::new();
        plant_stale_entries(&sandbox);

        sandbox
            .cmd()
            .arg("locks")
            .assert()
            .success()
            .stdout(predicate::str::contains("999999998"))
            .stdout(predicate::str::contains("999999999"))
            .stdout(predicate::str::contains("stale"));

        sandbox
            .cmd()
            .args(["locks", "--clear-stale"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 stale lock entries"));

        assert_no_registration(&sandbox);
    }

    #[cfg(unix)]
    #[test]
    fn dead_writer_does_not_block_commands() {
        let sandbox = Sandbox::new();
        plant_stale_entries(&sandbox);

        sandbox.cmd().arg("commands").assert().success();
    }

    #[test]
    fn live_writer_times_out_readers() {
        let sandbox = Sandbox::new();
        let writer = sandbox.lock_path(".writer");
        std::fs::create_dir_all(&writer).unwrap();
        std::fs::write(writer.join("pid"), std::process::id().to_string()).unwrap();

        sandbox
            .cmd()
            .arg("commands")
            .assert()
            .failure()
            .stderr(predicate::str::contains("active writer"))
            .stderr(predicate::str::contains("plugcache locks"));

        // The writer's lock is not ours to remove
        assert!(writer.join("pid").exists());
        assert!(!sandbox.lock_path(".readers").exists());
    }

    #[cfg(unix)]
    #[test]
    fn locks_reports_live_writer_without_waiting() {
        let sandbox = Sandbox::new();
        let writer = sandbox.lock_path(".writer");
        std::fs::create_dir_all(&writer).unwrap();
        let pid = std::process::id().to_string();
        std::fs::write(writer.join("pid"), &pid).unwrap();

        sandbox
            .cmd()
            .args(["locks", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(pid.as_str()))
            .stdout(predicate::str::contains("writer_since"));

        sandbox
            .cmd()
            .args(["locks", "--clear-stale"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 stale lock entries"));

        assert!(writer.join("pid").exists());
        assert!(!sandbox.lock_path(".readers").exists());
    }

    #[test]
    fn config_path_honors_env() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[lock]"))
            .stdout(predicate::str::contains("poll_interval_ms = 20"));
    }

    #[test]
    fn config_init_repairs_invalid_file() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.config_path(), "[lock\n").unwrap();

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));

        sandbox
            .cmd()
            .args(["config", "init", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        sandbox.cmd().args(["config", "show"]).assert().success();
    }

    #[test]
    fn clear_cache_env_forces_reparse() {
        let sandbox = Sandbox::new();
        let plugin = sandbox.install("db", DB_PLUGIN);
        sandbox.cmd().arg("commands").assert().success();

        std::fs::write(
            plugin.join("plugin.json"),
            DB_PLUGIN.replace("1.2.0", "2.0.0"),
        )
        .unwrap();

        sandbox
            .cmd()
            .args(["which", "db:pull"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1.2.0"));

        sandbox
            .cmd()
            .env("PLUGCACHE_CLEAR_CACHE", "1")
            .args(["which", "db:pull"])
            .assert()
            .success()
            .stdout(predicate::str::contains("2.0.0"));
    }
}
