mod splitter_props;
