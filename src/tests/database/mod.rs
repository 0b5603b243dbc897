mod library_store_tests;
