use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ASSETS: [&str; 9] = [
    "blobs/blazor-chat/appsettings.json",
    "blobs/container/appsettings.json",
    "blobs/container/client_secrets.json",
    "blobs/private/appsettings.json",
    "blobs/public/rosslyn-classes.txt",
    "docker/docker-compose-blazorcrud.yml",
    "docker/docker-compose-rosetta-stone.yml",
    "docker/docker-compose-roslyn-api.yml",
    "docker/docker-compose-sheets-notification.yml",
];

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    /// Project with a stack file and every asset the stack reads
    pub fn beckshome() -> Self {
        let project = Self::new();
        project.write_stack_yaml("name: beckshome\nlocation: eastus\n");
        for asset in ASSETS {
            project.write_asset(asset, &format!("# {asset}\n"));
        }
        project
    }

    pub fn write_stack_yaml(&self, content: &str) {
        fs::write(self.root.path().join("stackweave.yaml"), content).unwrap();
    }

    pub fn write_asset(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn remove_asset(&self, relative: &str) {
        fs::remove_file(self.root.path().join(relative)).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `weave` running inside the project, isolated from the user's config
    pub fn weave(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("weave").unwrap();
        cmd.current_dir(self.path())
            .env_remove("STACKWEAVE_CONFIG")
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"));
        cmd
    }
}
