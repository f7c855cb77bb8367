pub mod jobs_route;
