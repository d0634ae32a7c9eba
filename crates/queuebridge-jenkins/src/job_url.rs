//! Mapping from job paths to Jenkins URL segments.

/// Builds the base URL path for a job, folder levels included:
/// `teamA/build` becomes `job/teamA/job/build`.
pub fn job_base_path(job_path: &str) -> String {
    format!("job/{}", job_path.replace('/', "/job/"))
}
