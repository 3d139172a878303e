#[cfg(test)]
mod test {
    use assert_cmd::prelude::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;
    use std::process::Command;

    fn cmd_in(dir: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("kcube").unwrap();
        cmd.current_dir(dir.path());
        cmd
    }

    #[test]
    fn unknown_subcommand_fails() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("kcube")?;
        cmd.arg("frobnicate");
        cmd.assert().failure();
        Ok(())
    }

    #[test]
    fn init_creates_kcube_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        cmd_in(&dir).arg("init").assert().success();
        dir.child(".kcube").child("config.json").assert(predicate::path::is_file());
        Ok(())
    }

    #[test]
    fn status_outside_a_vault_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        cmd_in(&dir).arg("status").assert().failure().stderr(predicate::str::contains("not a K-Cube vault"));
        Ok(())
    }

    #[test]
    fn add_and_commit_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        cmd_in(&dir).arg("init").assert().success();
        dir.child("notes.md").write_str("hello")?;

        cmd_in(&dir).args(["add", "notes.md"]).assert().success();
        cmd_in(&dir)
            .args(["commit", "-m", "Add notes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Add notes"));

        cmd_in(&dir).arg("status").assert().success().stdout(predicate::str::contains("clean"));
        Ok(())
    }

    #[test]
    fn log_after_commit_shows_the_version() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        cmd_in(&dir).arg("init").assert().success();
        dir.child("a.txt").write_str("v1")?;
        cmd_in(&dir).args(["add", "a.txt"]).assert().success();
        cmd_in(&dir).args(["commit", "-m", "First"]).assert().success();

        cmd_in(&dir).arg("log").assert().success().stdout(predicate::str::contains("First"));
        Ok(())
    }
}
