use super::config::EnvSnapshot;

/// CI environment detection and pipeline metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CiInfo {
    /// `CI` or `GITLAB_CI` is set
    pub is_ci: bool,
    pub pipeline_url: Option<String>,
    pub job_url: Option<String>,
    pub project_url: Option<String>,
    pub commit_sha: Option<String>,
    pub branch: Option<String>,
}

impl CiInfo {
    pub fn detect(env: &EnvSnapshot) -> Self {
        let var = |name: &str| env.get(name).map(str::to_string);
        Self {
            is_ci: env.is_set("CI") || env.is_set("GITLAB_CI"),
            pipeline_url: var("CI_PIPELINE_URL"),
            job_url: var("CI_JOB_URL"),
            project_url: var("CI_PROJECT_URL"),
            commit_sha: var("CI_COMMIT_SHA"),
            branch: var("CI_COMMIT_REF_NAME"),
        }
    }

    /// First eight characters of the commit hash
    pub fn short_sha(&self) -> Option<&str> {
        self.commit_sha
            .as_deref()
            .map(|sha| sha.get(..8).unwrap_or(sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_gitlab() {
        let env = EnvSnapshot::from_pairs([
            ("GITLAB_CI", "true"),
            ("CI_PIPELINE_URL", "https://gitlab.example/p/1"),
            ("CI_COMMIT_SHA", "0123456789abcdef"),
            ("CI_COMMIT_REF_NAME", "main"),
        ]);
        let ci = CiInfo::detect(&env);
        assert!(ci.is_ci);
        assert_eq!(ci.short_sha(), Some("01234567"));
        assert_eq!(ci.branch.as_deref(), Some("main"));
        assert!(ci.job_url.is_none());
    }

    #[test]
    fn test_short_sha_shorter_than_eight() {
        let ci = CiInfo {
            commit_sha: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(ci.short_sha(), Some("abc"));
    }
}
