mod job_flow_tests;
